//! Assembling the metadata region and stamping the superblock.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use blocks::PackResult;
use compress::BlockCompressor;
use fstree::Tree;
use tracing::debug;

use crate::builder::BuildConfig;
use crate::layout;
use crate::metadata::MetaWriter;
use crate::superblock::{self, flags, Superblock};
use crate::tables;
use crate::ImageError;

/// Everything the builder reports after the superblock is in place.
pub(crate) struct WriteOutcome {
    pub(crate) superblock: Superblock,
    pub(crate) padded_size: u64,
}

/// Writes every metadata table after the data region, then the superblock,
/// then pads the archive and truncates any bytes a deduplication rewind
/// left beyond the end.
pub(crate) fn write_image(
    out: &mut File,
    tree: &Tree,
    pack: &PackResult,
    cfg: &BuildConfig,
    compressor: &BlockCompressor,
) -> Result<WriteOutcome, ImageError> {
    let mut inode_writer = MetaWriter::new(*compressor, cfg.compress_inodes);
    let mut dir_writer = MetaWriter::new(*compressor, cfg.compress_inodes);
    let tree_layout = layout::write_tree(tree, pack, &mut inode_writer, &mut dir_writer)?;

    let mut at = pack.data_end;

    let inode_table = at;
    let inode_stream = inode_writer.finish()?;
    out.seek(SeekFrom::Start(at))?;
    out.write_all(&inode_stream)?;
    at += inode_stream.len() as u64;

    let dir_table = at;
    let dir_stream = dir_writer.finish()?;
    out.write_all(&dir_stream)?;
    at += dir_stream.len() as u64;

    let frag_table = if pack.fragments.is_empty() {
        superblock::TABLE_ABSENT
    } else {
        let entries = tables::fragment_entries(&pack.fragments);
        tables::write_lookup_table(out, &mut at, &entries, compressor, cfg.compress_inodes)?
    };

    let id_entries = tables::id_entries(tree.ids().entries());
    let id_table =
        tables::write_lookup_table(out, &mut at, &id_entries, compressor, cfg.compress_inodes)?;

    let export_table = if cfg.exportable {
        let entries = tables::export_entries(&tree_layout.export_refs);
        tables::write_lookup_table(out, &mut at, &entries, compressor, cfg.compress_inodes)?
    } else {
        superblock::TABLE_ABSENT
    };

    let xattr_table = if tree.xattrs().is_empty() {
        superblock::TABLE_ABSENT
    } else {
        tables::write_xattr_table(out, &mut at, tree.xattrs(), compressor, cfg.compress_xattrs)?
    };

    let sb = Superblock {
        inode_count: tree.inode_count(),
        mod_time: cfg.mtime,
        block_size: cfg.block_size,
        frag_count: pack.fragments.len() as u32,
        compressor: compressor.codec(),
        flags: superblock_flags(cfg, pack, tree),
        id_count: tree.ids().len() as u16,
        root_inode: tree_layout.root_ref.encode(),
        bytes_used: at,
        id_table,
        xattr_table,
        inode_table,
        dir_table,
        frag_table,
        export_table,
    };
    out.seek(SeekFrom::Start(0))?;
    out.write_all(&sb.to_bytes())?;

    // End-of-archive padding. The pad is written, not just reserved: a
    // deduplication rewind can leave stale bytes between bytes_used and the
    // old end of file. set_len then drops anything past the boundary.
    let padded_size = if cfg.pad_to_4k { at.next_multiple_of(4096) } else { at };
    if padded_size > at {
        out.seek(SeekFrom::Start(at))?;
        out.write_all(&vec![0u8; (padded_size - at) as usize])?;
    }
    out.set_len(padded_size)?;
    out.flush()?;

    debug!(
        bytes_used = at,
        padded_size,
        inodes = sb.inode_count,
        fragments = sb.frag_count,
        "superblock stamped"
    );
    Ok(WriteOutcome { superblock: sb, padded_size })
}

fn superblock_flags(cfg: &BuildConfig, pack: &PackResult, tree: &Tree) -> u16 {
    let mut bits = 0;
    if !cfg.compress_inodes {
        bits |= flags::UNCOMPRESSED_INODES | flags::UNCOMPRESSED_IDS;
    }
    if !cfg.compress_data {
        bits |= flags::UNCOMPRESSED_DATA;
    }
    if !cfg.fragments {
        bits |= flags::NO_FRAGMENTS;
    } else if !cfg.compress_fragments && !pack.fragments.is_empty() {
        bits |= flags::UNCOMPRESSED_FRAGMENTS;
    }
    if cfg.dedup {
        bits |= flags::DUPLICATES;
    }
    if cfg.exportable {
        bits |= flags::EXPORTABLE;
    }
    if tree.xattrs().is_empty() {
        bits |= flags::NO_XATTRS;
    } else if !cfg.compress_xattrs {
        bits |= flags::UNCOMPRESSED_XATTRS;
    }
    bits
}
