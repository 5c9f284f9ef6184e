//! Inode record serialization.
//!
//! Every record starts with the common 16-byte header; the payload depends
//! on the type. Basic variants (1..=7) cover the common case; the extended
//! forms are emitted only when a field does not fit — hard links and sparse
//! or huge files for regular inodes, oversized listings or a lookup index
//! for directories, xattrs for everything.

use blocks::PackedFile;
use fstree::Node;

use crate::dirtable::ListingResult;
use crate::metadata::{MetaRef, MetaWriter};
use crate::ImageError;

/// Basic inode type ids; extended forms are `basic + 7`.
pub(crate) mod inode_type {
    pub(crate) const DIR: u16 = 1;
    pub(crate) const FILE: u16 = 2;
    pub(crate) const SYMLINK: u16 = 3;
    pub(crate) const BLOCK_DEV: u16 = 4;
    pub(crate) const CHAR_DEV: u16 = 5;
    pub(crate) const FIFO: u16 = 6;
    pub(crate) const SOCKET: u16 = 7;
    pub(crate) const EXTENDED: u16 = 7;
}

/// "No fragment" marker in file inodes.
pub(crate) const NO_FRAGMENT: u32 = u32::MAX;
/// "No xattrs" marker in extended inodes.
pub(crate) const NO_XATTR: u32 = u32::MAX;

struct Record {
    bytes: Vec<u8>,
}

impl Record {
    fn new(kind: u16, node: &Node) -> Result<Self, ImageError> {
        let (uid_idx, gid_idx) = node
            .id_refs
            .ok_or(ImageError::Internal("node missing id table indices"))?;
        let mut record = Self { bytes: Vec::with_capacity(64) };
        record.u16(kind);
        record.u16(node.attrs.mode);
        record.u16(uid_idx);
        record.u16(gid_idx);
        record.u32(node.attrs.mtime);
        record.u32(node.inode);
        Ok(record)
    }

    fn u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }
    fn u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }
    fn raw(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    fn emit(self, writer: &mut MetaWriter) -> Result<MetaRef, ImageError> {
        let loc = writer.position();
        writer.write(&self.bytes)?;
        Ok(loc)
    }
}

/// Writes a regular-file inode, choosing the extended form for hard-linked,
/// xattr-carrying, sparse, or 32-bit-overflowing files.
pub(crate) fn write_file(
    writer: &mut MetaWriter,
    node: &Node,
    packed: &PackedFile,
) -> Result<MetaRef, ImageError> {
    let (frag_index, frag_offset) = packed
        .fragment
        .map_or((NO_FRAGMENT, 0), |f| (f.index, f.offset));
    let basic = node.nlink == 1
        && node.xattr.is_none()
        && packed.sparse_bytes == 0
        && packed.file_size <= u64::from(u32::MAX)
        && packed.blocks_start <= u64::from(u32::MAX);

    let mut record = if basic {
        let mut r = Record::new(inode_type::FILE, node)?;
        r.u32(packed.blocks_start as u32);
        r.u32(frag_index);
        r.u32(frag_offset);
        r.u32(packed.file_size as u32);
        r
    } else {
        let mut r = Record::new(inode_type::FILE + inode_type::EXTENDED, node)?;
        r.u64(packed.blocks_start);
        r.u64(packed.file_size);
        r.u64(packed.sparse_bytes);
        r.u32(node.nlink);
        r.u32(frag_index);
        r.u32(frag_offset);
        r.u32(node.xattr.unwrap_or(NO_XATTR));
        r
    };
    for block in &packed.blocks {
        record.u32(block.size_word());
    }
    record.emit(writer)
}

/// Writes a directory inode over an already-written listing.
pub(crate) fn write_dir(
    writer: &mut MetaWriter,
    node: &Node,
    listing: &ListingResult,
    parent_inode: u32,
) -> Result<MetaRef, ImageError> {
    // The listing size is offset by 3, accounting for the "." and ".."
    // entries readers synthesize.
    let file_size = listing.size + 3;
    let basic = node.xattr.is_none() && listing.index.is_empty() && file_size <= u32::from(u16::MAX);

    let record = if basic {
        let mut r = Record::new(inode_type::DIR, node)?;
        r.u32(listing.start.block);
        r.u32(node.nlink);
        r.u16(file_size as u16);
        r.u16(listing.start.offset);
        r.u32(parent_inode);
        r
    } else {
        let mut r = Record::new(inode_type::DIR + inode_type::EXTENDED, node)?;
        r.u32(node.nlink);
        r.u32(file_size);
        r.u32(listing.start.block);
        r.u32(parent_inode);
        r.u16(listing.index.len() as u16);
        r.u16(listing.start.offset);
        r.u32(node.xattr.unwrap_or(NO_XATTR));
        for entry in &listing.index {
            r.u32(entry.index);
            r.u32(entry.start);
            r.u32(entry.name.len() as u32 - 1);
            r.raw(entry.name.as_bytes());
        }
        r
    };
    record.emit(writer)
}

/// Writes a symlink inode.
pub(crate) fn write_symlink(
    writer: &mut MetaWriter,
    node: &Node,
    target: &str,
) -> Result<MetaRef, ImageError> {
    let extended = node.xattr.is_some();
    let kind = if extended {
        inode_type::SYMLINK + inode_type::EXTENDED
    } else {
        inode_type::SYMLINK
    };
    let mut record = Record::new(kind, node)?;
    record.u32(node.nlink);
    record.u32(target.len() as u32);
    record.raw(target.as_bytes());
    if extended {
        record.u32(node.xattr.unwrap_or(NO_XATTR));
    }
    record.emit(writer)
}

/// Writes a device inode.
pub(crate) fn write_device(
    writer: &mut MetaWriter,
    node: &Node,
    block_device: bool,
    major: u32,
    minor: u32,
) -> Result<MetaRef, ImageError> {
    let base = if block_device { inode_type::BLOCK_DEV } else { inode_type::CHAR_DEV };
    let kind = if node.xattr.is_some() { base + inode_type::EXTENDED } else { base };
    let mut record = Record::new(kind, node)?;
    record.u32(node.nlink);
    record.u32(encode_dev(major, minor));
    if let Some(xattr) = node.xattr {
        record.u32(xattr);
    }
    record.emit(writer)
}

/// Writes a fifo or socket inode.
pub(crate) fn write_ipc(
    writer: &mut MetaWriter,
    node: &Node,
    socket: bool,
) -> Result<MetaRef, ImageError> {
    let base = if socket { inode_type::SOCKET } else { inode_type::FIFO };
    let kind = if node.xattr.is_some() { base + inode_type::EXTENDED } else { base };
    let mut record = Record::new(kind, node)?;
    record.u32(node.nlink);
    if let Some(xattr) = node.xattr {
        record.u32(xattr);
    }
    record.emit(writer)
}

/// The kernel's `new_encode_dev` packing.
pub(crate) fn encode_dev(major: u32, minor: u32) -> u32 {
    (major << 8) | (minor & 0xff) | ((minor & !0xffu32) << 12)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_encoding_matches_the_kernel() {
        // /dev/null: (1, 3).
        assert_eq!(encode_dev(1, 3), 0x103);
        // Minor bits above 8 move past bit 20.
        assert_eq!(encode_dev(8, 0x122), (8 << 8) | 0x22 | (0x100 << 12));
    }
}
