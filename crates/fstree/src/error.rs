//! Error type for tree construction and post-processing.

use thiserror::Error;

/// Errors raised while building or freezing the filesystem tree.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The final path component already exists with an incompatible kind.
    #[error("{path}: name conflict")]
    NameConflict {
        /// Path whose last component collided.
        path: String,
    },
    /// A path component resolved to something other than a directory.
    #[error("{path}: parent is not a directory")]
    ParentNotDirectory {
        /// The offending path.
        path: String,
    },
    /// The path is not canonical (empty component, `.`, `..`, or empty).
    #[error("{path}: invalid path")]
    InvalidPath {
        /// The rejected path.
        path: String,
    },
    /// A hard-link alias names a path that does not exist.
    #[error("{path}: hard link target {target} does not exist")]
    HardLinkTarget {
        /// Path of the alias.
        path: String,
        /// The missing target.
        target: String,
    },
    /// Hard-link aliases form a cycle.
    #[error("{path}: hard link cycle")]
    HardLinkCycle {
        /// Path of an alias on the cycle.
        path: String,
    },
    /// A hard link names a directory as its target.
    #[error("{path}: hard link target {target} is a directory")]
    HardLinkToDirectory {
        /// Path of the alias.
        path: String,
        /// The directory target.
        target: String,
    },
    /// Mode bits outside the 12-bit permission range.
    #[error("mode {mode:o} exceeds 07777")]
    ModeRange {
        /// The rejected mode.
        mode: u32,
    },
    /// More distinct uid/gid values than the 16-bit id index can address.
    #[error("too many distinct uid/gid values (limit {limit})")]
    TooManyIds {
        /// Maximum number of table entries.
        limit: usize,
    },
    /// An xattr key repeats within one node's set.
    #[error("duplicate xattr key {key}")]
    DuplicateXattr {
        /// The repeated key.
        key: String,
    },
    /// An xattr key carries no recognized namespace prefix.
    #[error("xattr key {key} has no recognized namespace prefix")]
    XattrNamespace {
        /// The rejected key.
        key: String,
    },
    /// Post-processing ran twice or a frozen tree was mutated.
    #[error("tree already post-processed")]
    AlreadyFrozen,
}
