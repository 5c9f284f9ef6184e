//! Extended-attribute set indexing.
//!
//! Every distinct set of (key, value) pairs is stored once; nodes carry an
//! index. Keys are canonicalized on entry: the namespace prefix (`user.`,
//! `trusted.`, `security.`) becomes a small tag and is stripped from the
//! stored key, matching the on-disk encoding.

use rustc_hash::FxHashMap;

use crate::TreeError;

/// Recognized xattr namespaces with their on-disk type tags.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum XattrNamespace {
    /// `user.` attributes.
    User = 0,
    /// `trusted.` attributes.
    Trusted = 1,
    /// `security.` attributes.
    Security = 2,
}

impl XattrNamespace {
    /// Splits a full key into its namespace tag and the remaining name.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::XattrNamespace`] for keys outside the three
    /// recognized prefixes.
    pub fn split(key: &str) -> Result<(Self, &str), TreeError> {
        for (prefix, ns) in [
            ("user.", Self::User),
            ("trusted.", Self::Trusted),
            ("security.", Self::Security),
        ] {
            if let Some(rest) = key.strip_prefix(prefix) {
                if !rest.is_empty() {
                    return Ok((ns, rest));
                }
            }
        }
        Err(TreeError::XattrNamespace { key: key.to_owned() })
    }

    /// The on-disk type tag.
    #[must_use]
    pub const fn tag(self) -> u16 {
        self as u16
    }

    /// The stripped prefix, used to reconstruct full keys.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::User => "user.",
            Self::Trusted => "trusted.",
            Self::Security => "security.",
        }
    }
}

/// One canonicalized attribute: namespace tag, stripped key, value bytes.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct XattrPair {
    /// Namespace tag.
    pub ns: XattrNamespace,
    /// Key with the namespace prefix removed.
    pub name: String,
    /// Value bytes, stored verbatim.
    pub value: Vec<u8>,
}

/// A canonicalized, name-sorted set of attributes.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Default)]
pub struct XattrSet {
    /// Sorted pairs.
    pub pairs: Vec<XattrPair>,
}

impl XattrSet {
    /// Sum of serialized entry sizes, used by the on-disk id record.
    #[must_use]
    pub fn serialized_size(&self) -> u32 {
        self.pairs
            .iter()
            .map(|p| 4 + p.name.len() as u32 + 4 + p.value.len() as u32)
            .sum()
    }
}

/// Accumulates one node's attributes between `begin` and `end`.
#[derive(Debug, Default)]
pub struct XattrBuilder {
    pairs: Vec<XattrPair>,
}

impl XattrBuilder {
    /// Starts an empty set.
    #[must_use]
    pub fn begin() -> Self {
        Self::default()
    }

    /// Adds one attribute under its full key (`user.name` form).
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::XattrNamespace`] for unrecognized prefixes.
    pub fn add(&mut self, key: &str, value: &[u8]) -> Result<(), TreeError> {
        let (ns, name) = XattrNamespace::split(key)?;
        self.pairs.push(XattrPair {
            ns,
            name: name.to_owned(),
            value: value.to_vec(),
        });
        Ok(())
    }

    /// Whether nothing was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Canonicalizes the set and interns it into `table`.
    ///
    /// Returns the set's index, or `None` for an empty set (nodes without
    /// attributes store no index at all).
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::DuplicateXattr`] when a key repeats.
    pub fn end(mut self, table: &mut XattrTable) -> Result<Option<u32>, TreeError> {
        if self.pairs.is_empty() {
            return Ok(None);
        }
        self.pairs.sort();
        for pair in self.pairs.windows(2) {
            if pair[0].ns == pair[1].ns && pair[0].name == pair[1].name {
                return Err(TreeError::DuplicateXattr {
                    key: format!("{}{}", pair[0].ns.prefix(), pair[0].name),
                });
            }
        }
        Ok(Some(table.intern(XattrSet { pairs: self.pairs })))
    }
}

/// All distinct attribute sets referenced by the tree.
#[derive(Debug, Default)]
pub struct XattrTable {
    sets: Vec<XattrSet>,
    index: FxHashMap<XattrSet, u32>,
}

impl XattrTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, set: XattrSet) -> u32 {
        if let Some(&idx) = self.index.get(&set) {
            return idx;
        }
        let idx = self.sets.len() as u32;
        self.index.insert(set.clone(), idx);
        self.sets.push(set);
        idx
    }

    /// The set stored at `index`.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&XattrSet> {
        self.sets.get(index as usize)
    }

    /// All sets in index order.
    #[must_use]
    pub fn sets(&self) -> &[XattrSet] {
        &self.sets
    }

    /// Number of distinct sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Whether no node carries attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_splitting() {
        assert_eq!(
            XattrNamespace::split("user.comment").unwrap(),
            (XattrNamespace::User, "comment")
        );
        assert_eq!(
            XattrNamespace::split("security.selinux").unwrap(),
            (XattrNamespace::Security, "selinux")
        );
        assert!(XattrNamespace::split("system.posix_acl_access").is_err());
        assert!(XattrNamespace::split("user.").is_err());
        assert!(XattrNamespace::split("bare").is_err());
    }

    #[test]
    fn sets_are_sorted_and_shared() {
        let mut table = XattrTable::new();

        let mut a = XattrBuilder::begin();
        a.add("user.b", b"2").unwrap();
        a.add("user.a", b"1").unwrap();
        let ia = a.end(&mut table).unwrap().unwrap();

        // Same pairs, different insertion order: must intern to the same set.
        let mut b = XattrBuilder::begin();
        b.add("user.a", b"1").unwrap();
        b.add("user.b", b"2").unwrap();
        let ib = b.end(&mut table).unwrap().unwrap();

        assert_eq!(ia, ib);
        assert_eq!(table.len(), 1);
        let set = table.get(ia).unwrap();
        assert_eq!(set.pairs[0].name, "a");
        assert_eq!(set.pairs[1].name, "b");
    }

    #[test]
    fn duplicate_keys_rejected() {
        let mut table = XattrTable::new();
        let mut b = XattrBuilder::begin();
        b.add("user.k", b"1").unwrap();
        b.add("user.k", b"2").unwrap();
        let err = b.end(&mut table).unwrap_err();
        assert!(matches!(err, TreeError::DuplicateXattr { .. }));
    }

    #[test]
    fn same_name_different_namespace_is_allowed() {
        let mut table = XattrTable::new();
        let mut b = XattrBuilder::begin();
        b.add("user.k", b"1").unwrap();
        b.add("trusted.k", b"2").unwrap();
        assert!(b.end(&mut table).unwrap().is_some());
    }

    #[test]
    fn empty_set_has_no_index() {
        let mut table = XattrTable::new();
        assert_eq!(XattrBuilder::begin().end(&mut table).unwrap(), None);
        assert!(table.is_empty());
    }

    #[test]
    fn serialized_size_counts_headers() {
        let mut table = XattrTable::new();
        let mut b = XattrBuilder::begin();
        b.add("user.ab", b"xyz").unwrap();
        let idx = b.end(&mut table).unwrap().unwrap();
        // 4-byte key header + "ab" + 4-byte value header + "xyz".
        assert_eq!(table.get(idx).unwrap().serialized_size(), 4 + 2 + 4 + 3);
    }
}
