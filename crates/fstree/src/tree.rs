//! The tree arena and its post-processing pass.

use crate::node::{Node, NodeAttrs, NodeId, NodeKind, NodePayload};
use crate::sort::SortOrder;
use crate::xattr::XattrTable;
use crate::{IdTable, TreeError};

/// Counts produced by [`Tree::post_process`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TreeTotals {
    /// Number of inodes assigned (aliases share their target's).
    pub inode_count: u32,
    /// Number of concrete regular files on the packing list.
    pub file_count: usize,
}

/// The in-memory filesystem forest, rooted at `/`.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    xattrs: XattrTable,
    ids: IdTable,
    files: Vec<NodeId>,
    aliases: Vec<NodeId>,
    inode_count: u32,
    frozen: bool,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Creates a tree holding only the root directory with default attributes.
    #[must_use]
    pub fn new() -> Self {
        let root = Node::new(
            String::new(),
            None,
            NodeKind::Directory,
            NodeAttrs::default_dir(),
            NodePayload::Directory { children: Vec::new() },
        );
        Self {
            nodes: vec![root],
            xattrs: XattrTable::new(),
            ids: IdTable::default(),
            files: Vec::new(),
            aliases: Vec::new(),
            inode_count: 0,
            frozen: false,
        }
    }

    /// Id of the root directory.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        0
    }

    /// Borrows a node.
    ///
    /// # Panics
    ///
    /// Panics on an id that did not come from this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    /// Mutably borrows a node. Only meaningful before the tree is frozen.
    #[must_use]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id as usize]
    }

    /// Number of nodes, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; the root exists from construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The xattr table, for routing scanner output through [`crate::XattrBuilder`].
    #[must_use]
    pub fn xattrs(&self) -> &XattrTable {
        &self.xattrs
    }

    /// Mutable access to the xattr table.
    pub fn xattrs_mut(&mut self) -> &mut XattrTable {
        &mut self.xattrs
    }

    /// The id table; empty until [`Tree::post_process`] runs.
    #[must_use]
    pub fn ids(&self) -> &IdTable {
        &self.ids
    }

    /// Regular files in packing order; empty until post-processing.
    #[must_use]
    pub fn files(&self) -> &[NodeId] {
        &self.files
    }

    /// Inodes assigned by post-processing.
    #[must_use]
    pub const fn inode_count(&self) -> u32 {
        self.inode_count
    }

    /// Adds a node at `path`, creating missing intermediate directories with
    /// default attributes.
    ///
    /// Re-adding an existing directory as a directory overwrites its
    /// attributes; any other collision is a name conflict.
    ///
    /// # Errors
    ///
    /// [`TreeError::InvalidPath`], [`TreeError::ParentNotDirectory`],
    /// [`TreeError::NameConflict`], [`TreeError::ModeRange`], or
    /// [`TreeError::AlreadyFrozen`].
    pub fn add(
        &mut self,
        path: &str,
        attrs: NodeAttrs,
        payload: NodePayload,
    ) -> Result<NodeId, TreeError> {
        if self.frozen {
            return Err(TreeError::AlreadyFrozen);
        }
        if attrs.mode > 0o7777 {
            return Err(TreeError::ModeRange { mode: u32::from(attrs.mode) });
        }
        let kind = payload_kind(&payload);
        let components = split_path(path)?;

        // "/" itself: only a directory addition may restate the root.
        let Some((last, parents)) = components.split_last() else {
            if kind == NodeKind::Directory {
                self.nodes[0].attrs = attrs;
                return Ok(self.root());
            }
            return Err(TreeError::InvalidPath { path: path.to_owned() });
        };

        let mut current = self.root();
        for component in parents {
            current = self.descend(current, component, path)?;
        }

        if let Some(existing) = self.child_by_name(current, last) {
            let node = &mut self.nodes[existing as usize];
            if node.kind.merges_with(kind) {
                node.attrs = attrs;
                return Ok(existing);
            }
            return Err(TreeError::NameConflict { path: path.to_owned() });
        }

        let id = self.push_node(Node::new(
            (*last).to_owned(),
            Some(current),
            kind,
            attrs,
            payload,
        ));
        if kind == NodeKind::HardLink {
            self.aliases.push(id);
        }
        Ok(id)
    }

    /// Records a hard-link alias at `path` pointing at `target`, to be
    /// resolved during post-processing.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Tree::add`].
    pub fn add_hard_link(&mut self, path: &str, target: &str) -> Result<NodeId, TreeError> {
        self.add(
            path,
            NodeAttrs::default_dir(),
            NodePayload::HardLink { target: target.to_owned(), resolved: None },
        )
    }

    /// Resolves a canonical path to a node, never following symlinks.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<NodeId> {
        let components = split_path(path).ok()?;
        let mut current = self.root();
        for component in &components {
            if !self.nodes[current as usize].is_dir() {
                return None;
            }
            current = self.child_by_name(current, component)?;
        }
        Some(current)
    }

    /// Reconstructs the canonical path of a node (`/` for the root).
    #[must_use]
    pub fn path_of(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let node = &self.nodes[cur as usize];
            if !node.name.is_empty() {
                parts.push(node.name.as_str());
            }
            current = node.parent;
        }
        if parts.is_empty() {
            return "/".to_owned();
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Applies force-uid/force-gid to every node. Must run before
    /// post-processing so the id table reflects the override.
    pub fn override_owners(&mut self, uid: Option<u32>, gid: Option<u32>) {
        for node in &mut self.nodes {
            if let Some(uid) = uid {
                node.attrs.uid = uid;
            }
            if let Some(gid) = gid {
                node.attrs.gid = gid;
            }
        }
    }

    /// Freezes the tree: sorts children, assigns inode numbers, resolves
    /// hard links, builds the packing list and the id table.
    ///
    /// # Errors
    ///
    /// [`TreeError::AlreadyFrozen`] on a second call; hard-link resolution
    /// and id-table errors as documented on their types.
    pub fn post_process(&mut self) -> Result<TreeTotals, TreeError> {
        if self.frozen {
            return Err(TreeError::AlreadyFrozen);
        }

        self.sort_children();

        // Inode numbers: pre-order over sorted children, concrete nodes only.
        let order = self.preorder();
        let mut next_inode = 1u32;
        for &id in &order {
            let node = &mut self.nodes[id as usize];
            if node.kind != NodeKind::HardLink {
                node.inode = next_inode;
                next_inode += 1;
            }
        }
        self.inode_count = next_inode - 1;

        self.resolve_hard_links()?;
        self.count_links(&order);

        self.files = order
            .iter()
            .copied()
            .filter(|&id| self.nodes[id as usize].is_file())
            .collect();

        self.ids = IdTable::build(self.nodes.iter().map(|n| (n.attrs.uid, n.attrs.gid)))?;
        for node in &mut self.nodes {
            let uid_idx = self.ids.index_of(node.attrs.uid);
            let gid_idx = self.ids.index_of(node.attrs.gid);
            // Both were fed into the build above.
            node.id_refs = uid_idx.zip(gid_idx);
        }

        self.frozen = true;
        Ok(TreeTotals {
            inode_count: self.inode_count,
            file_count: self.files.len(),
        })
    }

    /// Reorders the packing list by descending sort-file priority; equal
    /// priorities keep inode order (the sort is stable).
    pub fn apply_sort_order(&mut self, order: &SortOrder) {
        if order.is_empty() {
            return;
        }
        let paths: Vec<(NodeId, i32)> = self
            .files
            .iter()
            .map(|&id| (id, order.priority(&self.path_of(id))))
            .collect();
        let mut indexed: Vec<usize> = (0..paths.len()).collect();
        indexed.sort_by_key(|&i| std::cmp::Reverse(paths[i].1));
        self.files = indexed.into_iter().map(|i| paths[i].0).collect();
    }

    /// Pre-order traversal of the (sorted) tree, root first.
    #[must_use]
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            let node = &self.nodes[id as usize];
            for &child in node.children().iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        let id = self.nodes.len() as NodeId;
        let parent = node.parent;
        self.nodes.push(node);
        if let Some(parent) = parent {
            if let NodePayload::Directory { children } = &mut self.nodes[parent as usize].payload {
                children.push(id);
            }
        }
        id
    }

    fn descend(&mut self, parent: NodeId, name: &str, path: &str) -> Result<NodeId, TreeError> {
        if let Some(child) = self.child_by_name(parent, name) {
            if !self.nodes[child as usize].is_dir() {
                return Err(TreeError::ParentNotDirectory { path: path.to_owned() });
            }
            return Ok(child);
        }
        Ok(self.push_node(Node::new(
            name.to_owned(),
            Some(parent),
            NodeKind::Directory,
            NodeAttrs::default_dir(),
            NodePayload::Directory { children: Vec::new() },
        )))
    }

    fn child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[parent as usize]
            .children()
            .iter()
            .copied()
            .find(|&c| self.nodes[c as usize].name == name)
    }

    fn sort_children(&mut self) {
        for idx in 0..self.nodes.len() {
            let NodePayload::Directory { children } = &self.nodes[idx].payload else {
                continue;
            };
            let mut sorted = children.clone();
            sorted.sort_by(|&a, &b| self.nodes[a as usize].name.cmp(&self.nodes[b as usize].name));
            if let NodePayload::Directory { children } = &mut self.nodes[idx].payload {
                *children = sorted;
            }
        }
    }

    fn resolve_hard_links(&mut self) -> Result<(), TreeError> {
        for alias_idx in 0..self.aliases.len() {
            let alias = self.aliases[alias_idx];
            let alias_path = self.path_of(alias);

            let mut visited = vec![alias];
            let mut target_path = match &self.nodes[alias as usize].payload {
                NodePayload::HardLink { target, .. } => target.clone(),
                _ => continue,
            };
            let target = loop {
                let Some(found) = self.resolve(&target_path) else {
                    return Err(TreeError::HardLinkTarget {
                        path: alias_path,
                        target: target_path,
                    });
                };
                match &self.nodes[found as usize].payload {
                    NodePayload::HardLink { target: next, .. } => {
                        if visited.contains(&found) {
                            return Err(TreeError::HardLinkCycle { path: alias_path });
                        }
                        visited.push(found);
                        target_path = next.clone();
                    }
                    NodePayload::Directory { .. } => {
                        return Err(TreeError::HardLinkToDirectory {
                            path: alias_path,
                            target: target_path,
                        });
                    }
                    _ => break found,
                }
            };

            let inode = self.nodes[target as usize].inode;
            self.nodes[target as usize].nlink += 1;
            let alias_node = &mut self.nodes[alias as usize];
            alias_node.inode = inode;
            if let NodePayload::HardLink { resolved, .. } = &mut alias_node.payload {
                *resolved = Some(target);
            }
        }
        Ok(())
    }

    fn count_links(&mut self, order: &[NodeId]) {
        for &id in order {
            if !self.nodes[id as usize].is_dir() {
                continue;
            }
            let subdirs = self.nodes[id as usize]
                .children()
                .iter()
                .filter(|&&c| self.nodes[c as usize].is_dir())
                .count() as u32;
            self.nodes[id as usize].nlink = 2 + subdirs;
        }
    }
}

/// Splits a canonical path into components, rejecting non-canonical forms.
fn split_path(path: &str) -> Result<Vec<&str>, TreeError> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let mut components = Vec::new();
    for component in trimmed.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(TreeError::InvalidPath { path: path.to_owned() });
        }
        components.push(component);
    }
    Ok(components)
}

fn payload_kind(payload: &NodePayload) -> NodeKind {
    match payload {
        NodePayload::Directory { .. } => NodeKind::Directory,
        NodePayload::File { .. } => NodeKind::File,
        NodePayload::Symlink { .. } => NodeKind::Symlink,
        NodePayload::CharDevice { .. } => NodeKind::CharDevice,
        NodePayload::BlockDevice { .. } => NodeKind::BlockDevice,
        NodePayload::Fifo => NodeKind::Fifo,
        NodePayload::Socket => NodeKind::Socket,
        NodePayload::HardLink { .. } => NodeKind::HardLink,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FileData;

    fn attrs(mode: u16, uid: u32, gid: u32) -> NodeAttrs {
        NodeAttrs { mode, uid, gid, mtime: 0 }
    }

    fn file_payload(bytes: &[u8]) -> NodePayload {
        NodePayload::File {
            data: FileData::Inline(bytes.to_vec()),
            no_fragment: false,
        }
    }

    #[test]
    fn add_creates_intermediate_directories() {
        let mut tree = Tree::new();
        let id = tree.add("/a/b/c", attrs(0o644, 0, 0), file_payload(b"x")).unwrap();
        assert_eq!(tree.path_of(id), "/a/b/c");

        let a = tree.resolve("/a").unwrap();
        assert!(tree.node(a).is_dir());
        assert_eq!(tree.node(a).attrs, NodeAttrs::default_dir());
    }

    #[test]
    fn explicit_directory_overwrites_defaults() {
        let mut tree = Tree::new();
        tree.add("/a/b", attrs(0o644, 0, 0), file_payload(b"")).unwrap();
        let a = tree
            .add("/a", attrs(0o700, 5, 6), NodePayload::Directory { children: Vec::new() })
            .unwrap();
        assert_eq!(tree.node(a).attrs, attrs(0o700, 5, 6));
        // The existing child list is untouched.
        assert_eq!(tree.node(a).children().len(), 1);
    }

    #[test]
    fn conflicting_kinds_are_rejected() {
        let mut tree = Tree::new();
        tree.add("/x", attrs(0o644, 0, 0), file_payload(b"")).unwrap();
        let err = tree
            .add("/x", attrs(0o755, 0, 0), NodePayload::Directory { children: Vec::new() })
            .unwrap_err();
        assert!(matches!(err, TreeError::NameConflict { .. }));

        let err = tree.add("/x", attrs(0o644, 0, 0), file_payload(b"")).unwrap_err();
        assert!(matches!(err, TreeError::NameConflict { .. }));
    }

    #[test]
    fn file_component_in_the_middle_fails() {
        let mut tree = Tree::new();
        tree.add("/x", attrs(0o644, 0, 0), file_payload(b"")).unwrap();
        let err = tree.add("/x/y", attrs(0o644, 0, 0), file_payload(b"")).unwrap_err();
        assert!(matches!(err, TreeError::ParentNotDirectory { .. }));
    }

    #[test]
    fn invalid_paths_are_rejected() {
        let mut tree = Tree::new();
        for path in ["/a//b", "/a/./b", "/a/../b", "//"] {
            let err = tree.add(path, attrs(0o644, 0, 0), file_payload(b"")).unwrap_err();
            assert!(matches!(err, TreeError::InvalidPath { .. }), "{path}");
        }
    }

    #[test]
    fn mode_above_7777_is_a_limit_error() {
        let mut tree = Tree::new();
        let err = tree.add("/x", attrs(0o17777, 0, 0), file_payload(b"")).unwrap_err();
        assert!(matches!(err, TreeError::ModeRange { .. }));
    }

    #[test]
    fn resolve_walks_the_directory_chain() {
        let mut tree = Tree::new();
        let id = tree.add("/usr/bin/sh", attrs(0o755, 0, 0), file_payload(b"")).unwrap();
        assert_eq!(tree.resolve("/usr/bin/sh"), Some(id));
        assert_eq!(tree.resolve("usr/bin/sh"), Some(id));
        assert_eq!(tree.resolve("/usr/bin/bash"), None);
        assert_eq!(tree.resolve("/"), Some(tree.root()));
    }

    #[test]
    fn post_process_assigns_contiguous_inodes_preorder() {
        let mut tree = Tree::new();
        tree.add("/b/file2", attrs(0o644, 0, 0), file_payload(b"2")).unwrap();
        tree.add("/a/file1", attrs(0o644, 0, 0), file_payload(b"1")).unwrap();
        let totals = tree.post_process().unwrap();
        assert_eq!(totals.inode_count, 5);

        // Pre-order over sorted children: / (1), /a (2), /a/file1 (3),
        // /b (4), /b/file2 (5).
        assert_eq!(tree.node(tree.root()).inode, 1);
        assert_eq!(tree.node(tree.resolve("/a").unwrap()).inode, 2);
        assert_eq!(tree.node(tree.resolve("/a/file1").unwrap()).inode, 3);
        assert_eq!(tree.node(tree.resolve("/b").unwrap()).inode, 4);
        assert_eq!(tree.node(tree.resolve("/b/file2").unwrap()).inode, 5);
    }

    #[test]
    fn empty_tree_has_root_inode_one() {
        let mut tree = Tree::new();
        let totals = tree.post_process().unwrap();
        assert_eq!(totals.inode_count, 1);
        assert_eq!(tree.node(tree.root()).inode, 1);
        assert_eq!(totals.file_count, 0);
    }

    #[test]
    fn children_sorted_by_byte_order() {
        let mut tree = Tree::new();
        for name in ["zeta", "Alpha", "beta", "123"] {
            tree.add(&format!("/{name}"), attrs(0o644, 0, 0), file_payload(b"")).unwrap();
        }
        tree.post_process().unwrap();
        let names: Vec<&str> = tree
            .node(tree.root())
            .children()
            .iter()
            .map(|&c| tree.node(c).name.as_str())
            .collect();
        assert_eq!(names, ["123", "Alpha", "beta", "zeta"]);
    }

    #[test]
    fn hard_link_shares_inode_and_bumps_nlink() {
        let mut tree = Tree::new();
        tree.add("/a", attrs(0o644, 0, 0), file_payload(b"body")).unwrap();
        tree.add_hard_link("/b", "/a").unwrap();
        tree.post_process().unwrap();

        let a = tree.resolve("/a").unwrap();
        let b = tree.resolve("/b").unwrap();
        assert_eq!(tree.node(a).inode, tree.node(b).inode);
        assert_eq!(tree.node(a).nlink, 2);
        // Only the concrete file packs.
        assert_eq!(tree.files(), &[a]);
    }

    #[test]
    fn hard_link_chain_resolves_to_the_concrete_node() {
        let mut tree = Tree::new();
        tree.add("/real", attrs(0o644, 0, 0), file_payload(b"x")).unwrap();
        tree.add_hard_link("/l1", "/real").unwrap();
        tree.add_hard_link("/l2", "/l1").unwrap();
        tree.post_process().unwrap();

        let real = tree.resolve("/real").unwrap();
        assert_eq!(tree.node(real).nlink, 3);
        let l2 = tree.resolve("/l2").unwrap();
        assert_eq!(tree.node(l2).inode, tree.node(real).inode);
    }

    #[test]
    fn hard_link_cycle_is_an_error() {
        let mut tree = Tree::new();
        tree.add_hard_link("/p", "/q").unwrap();
        tree.add_hard_link("/q", "/p").unwrap();
        let err = tree.post_process().unwrap_err();
        assert!(matches!(err, TreeError::HardLinkCycle { .. }));
    }

    #[test]
    fn hard_link_to_missing_target_is_an_error() {
        let mut tree = Tree::new();
        tree.add_hard_link("/b", "/nope").unwrap();
        let err = tree.post_process().unwrap_err();
        assert!(matches!(err, TreeError::HardLinkTarget { .. }));
    }

    #[test]
    fn hard_link_to_directory_is_an_error() {
        let mut tree = Tree::new();
        tree.add("/d", attrs(0o755, 0, 0), NodePayload::Directory { children: Vec::new() })
            .unwrap();
        tree.add_hard_link("/b", "/d").unwrap();
        let err = tree.post_process().unwrap_err();
        assert!(matches!(err, TreeError::HardLinkToDirectory { .. }));
    }

    #[test]
    fn directory_nlink_counts_subdirectories() {
        let mut tree = Tree::new();
        tree.add("/d/s1", attrs(0o755, 0, 0), NodePayload::Directory { children: Vec::new() })
            .unwrap();
        tree.add("/d/s2", attrs(0o755, 0, 0), NodePayload::Directory { children: Vec::new() })
            .unwrap();
        tree.add("/d/f", attrs(0o644, 0, 0), file_payload(b"")).unwrap();
        tree.post_process().unwrap();

        let d = tree.resolve("/d").unwrap();
        assert_eq!(tree.node(d).nlink, 4);
    }

    #[test]
    fn id_table_is_built_and_indices_assigned() {
        let mut tree = Tree::new();
        tree.add("/f", attrs(0o644, 1000, 100), file_payload(b"")).unwrap();
        tree.post_process().unwrap();

        // Root contributes (0, 0); the file contributes (1000, 100).
        assert_eq!(tree.ids().entries(), &[0, 100, 1000]);
        let f = tree.resolve("/f").unwrap();
        let (uid_idx, gid_idx) = tree.node(f).id_refs.unwrap();
        assert_eq!(tree.ids().get(uid_idx), Some(1000));
        assert_eq!(tree.ids().get(gid_idx), Some(100));
    }

    #[test]
    fn owner_override_applies_to_every_node() {
        let mut tree = Tree::new();
        tree.add("/f", attrs(0o644, 1000, 100), file_payload(b"")).unwrap();
        tree.override_owners(Some(0), None);
        tree.post_process().unwrap();

        let f = tree.resolve("/f").unwrap();
        assert_eq!(tree.node(f).attrs.uid, 0);
        assert_eq!(tree.node(f).attrs.gid, 100);
        assert_eq!(tree.ids().entries(), &[0, 100]);
    }

    #[test]
    fn post_process_twice_fails() {
        let mut tree = Tree::new();
        tree.post_process().unwrap();
        assert!(matches!(tree.post_process(), Err(TreeError::AlreadyFrozen)));
    }

    #[test]
    fn sort_order_reorders_files_stably() {
        let mut tree = Tree::new();
        tree.add("/a", attrs(0o644, 0, 0), file_payload(b"a")).unwrap();
        tree.add("/b", attrs(0o644, 0, 0), file_payload(b"b")).unwrap();
        tree.add("/c", attrs(0o644, 0, 0), file_payload(b"c")).unwrap();
        tree.post_process().unwrap();

        let order = SortOrder::parse(std::io::Cursor::new("/c 10\n")).unwrap();
        tree.apply_sort_order(&order);
        let paths: Vec<String> = tree.files().iter().map(|&id| tree.path_of(id)).collect();
        // /c first; /a and /b keep their relative (inode) order.
        assert_eq!(paths, ["/c", "/a", "/b"]);
    }
}
