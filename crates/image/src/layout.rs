//! The post-order pass that serializes inodes and directory listings.
//!
//! Children are written before their parent so a directory inode can point
//! at its finished listing, and a listing can point at its children's inode
//! records. Hard-link aliases force the target's record out early if the
//! alias is encountered first; the record is written exactly once either
//! way.

use blocks::{PackResult, PackedFile};
use fstree::{NodeId, NodePayload, Tree};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::dirtable::{self, DirEntryInfo};
use crate::inode::{self, inode_type};
use crate::metadata::{MetaRef, MetaWriter};
use crate::ImageError;

/// What the traversal leaves behind for the superblock and export table.
pub(crate) struct TreeLayout {
    /// Metadata reference of the root directory inode.
    pub(crate) root_ref: MetaRef,
    /// Inode reference per inode number (index `inode - 1`).
    pub(crate) export_refs: Vec<u64>,
}

/// Serializes every inode and directory listing.
pub(crate) fn write_tree(
    tree: &Tree,
    pack: &PackResult,
    inode_writer: &mut MetaWriter,
    dir_writer: &mut MetaWriter,
) -> Result<TreeLayout, ImageError> {
    let mut pass = LayoutPass {
        tree,
        packed: tree.files().iter().copied().zip(pack.files.iter()).collect(),
        inode_writer,
        dir_writer,
        written: FxHashMap::default(),
        export_refs: vec![0u64; tree.inode_count() as usize],
    };
    let root = pass.write_node(tree.root(), tree.inode_count() + 1)?;
    Ok(TreeLayout { root_ref: root.loc, export_refs: pass.export_refs })
}

struct LayoutPass<'a> {
    tree: &'a Tree,
    packed: FxHashMap<NodeId, &'a PackedFile>,
    inode_writer: &'a mut MetaWriter,
    dir_writer: &'a mut MetaWriter,
    /// Non-directory records already emitted, keyed by node.
    written: FxHashMap<NodeId, (MetaRef, u16)>,
    export_refs: Vec<u64>,
}

impl LayoutPass<'_> {
    fn write_node(&mut self, id: NodeId, parent_inode: u32) -> Result<DirEntryInfo, ImageError> {
        let node = self.tree.node(id);
        match &node.payload {
            NodePayload::Directory { .. } => {
                let children = node.children().to_vec();
                let inode_num = node.inode;
                let mut entries = Vec::with_capacity(children.len());
                for child in children {
                    entries.push(self.write_node(child, inode_num)?);
                }
                let listing = dirtable::write_listing(self.dir_writer, &entries)?;
                let loc = inode::write_dir(self.inode_writer, node, &listing, parent_inode)?;
                trace!(path = %self.tree.path_of(id), inode = inode_num, "directory written");
                self.record_export(inode_num, loc);
                Ok(DirEntryInfo {
                    loc,
                    inode: inode_num,
                    entry_type: inode_type::DIR,
                    name: node.name.clone(),
                })
            }
            NodePayload::HardLink { resolved, .. } => {
                let target = resolved
                    .ok_or(ImageError::Internal("unresolved hard link survived post-processing"))?;
                let (loc, entry_type) = self.write_leaf(target)?;
                Ok(DirEntryInfo { loc, inode: node.inode, entry_type, name: node.name.clone() })
            }
            _ => {
                let (loc, entry_type) = self.write_leaf(id)?;
                Ok(DirEntryInfo { loc, inode: node.inode, entry_type, name: node.name.clone() })
            }
        }
    }

    /// Writes a non-directory inode record once, memoizing its location so
    /// every directory entry of a hard-linked inode agrees.
    fn write_leaf(&mut self, id: NodeId) -> Result<(MetaRef, u16), ImageError> {
        if let Some(&written) = self.written.get(&id) {
            return Ok(written);
        }
        let node = self.tree.node(id);
        let (loc, entry_type) = match &node.payload {
            NodePayload::File { .. } => {
                let packed = self
                    .packed
                    .get(&id)
                    .copied()
                    .ok_or(ImageError::Internal("file missing from the packing results"))?;
                (inode::write_file(self.inode_writer, node, packed)?, inode_type::FILE)
            }
            NodePayload::Symlink { target } => {
                (inode::write_symlink(self.inode_writer, node, target)?, inode_type::SYMLINK)
            }
            NodePayload::CharDevice { major, minor } => (
                inode::write_device(self.inode_writer, node, false, *major, *minor)?,
                inode_type::CHAR_DEV,
            ),
            NodePayload::BlockDevice { major, minor } => (
                inode::write_device(self.inode_writer, node, true, *major, *minor)?,
                inode_type::BLOCK_DEV,
            ),
            NodePayload::Fifo => {
                (inode::write_ipc(self.inode_writer, node, false)?, inode_type::FIFO)
            }
            NodePayload::Socket => {
                (inode::write_ipc(self.inode_writer, node, true)?, inode_type::SOCKET)
            }
            NodePayload::Directory { .. } | NodePayload::HardLink { .. } => {
                return Err(ImageError::Internal("leaf writer handed a non-leaf node"));
            }
        };
        self.written.insert(id, (loc, entry_type));
        self.record_export(node.inode, loc);
        Ok((loc, entry_type))
    }

    fn record_export(&mut self, inode_num: u32, loc: MetaRef) {
        if let Some(slot) = self.export_refs.get_mut(inode_num as usize - 1) {
            *slot = loc.encode();
        }
    }
}
