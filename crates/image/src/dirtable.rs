//! Directory listings: headered runs of variable-size entries, plus the
//! per-directory lookup index for large listings.

use crate::metadata::{MetaRef, MetaWriter};
use crate::ImageError;

/// Longest run a single header may cover.
pub(crate) const MAX_RUN: usize = 256;

/// One child of a directory, ready to serialize.
#[derive(Clone, Debug)]
pub(crate) struct DirEntryInfo {
    /// Location of the child's inode record in the inode stream.
    pub(crate) loc: MetaRef,
    /// The child's inode number (the target's, for hard links).
    pub(crate) inode: u32,
    /// Basic inode type, even when the record is extended.
    pub(crate) entry_type: u16,
    /// Entry name.
    pub(crate) name: String,
}

/// An index entry of an extended directory: where run `index` bytes into
/// the listing starts in the directory stream.
#[derive(Clone, Debug)]
pub(crate) struct IndexEntry {
    /// Byte position within the uncompressed listing.
    pub(crate) index: u32,
    /// Directory-stream chunk offset holding that position.
    pub(crate) start: u32,
    /// Name of the first entry of the run.
    pub(crate) name: String,
}

/// What a serialized listing looks like from the directory inode.
#[derive(Clone, Debug)]
pub(crate) struct ListingResult {
    /// Where the listing starts in the directory stream.
    pub(crate) start: MetaRef,
    /// Listing size in bytes (the inode stores this plus 3).
    pub(crate) size: u32,
    /// Lookup index entries, one per metadata chunk the listing spans
    /// beyond its first.
    pub(crate) index: Vec<IndexEntry>,
}

/// Serializes one directory's children into the directory stream.
///
/// Entries are grouped into runs sharing an inode chunk and an `i16` inode
/// delta; each run is prefixed by `{count-1, chunk, base inode}`. An index
/// entry is recorded whenever the stream crosses into a new metadata chunk.
pub(crate) fn write_listing(
    writer: &mut MetaWriter,
    entries: &[DirEntryInfo],
) -> Result<ListingResult, ImageError> {
    let start = writer.position();
    let mut size = 0u32;
    let mut index = Vec::new();
    let mut indexed_block = start.block;

    let mut at = 0;
    while at < entries.len() {
        let head = &entries[at];
        let mut run = 1;
        while at + run < entries.len() && run < MAX_RUN {
            let entry = &entries[at + run];
            if entry.loc.block != head.loc.block {
                break;
            }
            let delta = i64::from(entry.inode) - i64::from(head.inode);
            if i16::try_from(delta).is_err() {
                break;
            }
            run += 1;
        }

        let position = writer.position();
        if position.block != indexed_block {
            indexed_block = position.block;
            index.push(IndexEntry {
                index: size,
                start: position.block,
                name: head.name.clone(),
            });
        }

        let mut bytes = Vec::with_capacity(12 + run * 16);
        bytes.extend_from_slice(&(run as u32 - 1).to_le_bytes());
        bytes.extend_from_slice(&head.loc.block.to_le_bytes());
        bytes.extend_from_slice(&head.inode.to_le_bytes());
        for entry in &entries[at..at + run] {
            let delta = (i64::from(entry.inode) - i64::from(head.inode)) as i16;
            bytes.extend_from_slice(&entry.loc.offset.to_le_bytes());
            bytes.extend_from_slice(&delta.to_le_bytes());
            bytes.extend_from_slice(&entry.entry_type.to_le_bytes());
            bytes.extend_from_slice(&(entry.name.len() as u16 - 1).to_le_bytes());
            bytes.extend_from_slice(entry.name.as_bytes());
        }
        writer.write(&bytes)?;
        size += bytes.len() as u32;
        at += run;
    }

    Ok(ListingResult { start, size, index })
}

#[cfg(test)]
mod tests {
    use super::*;
    use compress::{BlockCompressor, Codec};

    fn meta_writer() -> MetaWriter {
        MetaWriter::new(BlockCompressor::new(Codec::Gzip).unwrap(), true)
    }

    fn entry(block: u32, offset: u16, inode: u32, name: &str) -> DirEntryInfo {
        DirEntryInfo {
            loc: MetaRef { block, offset },
            inode,
            entry_type: 2,
            name: name.to_owned(),
        }
    }

    #[test]
    fn empty_listing_is_empty() {
        let mut w = meta_writer();
        let listing = write_listing(&mut w, &[]).unwrap();
        assert_eq!(listing.size, 0);
        assert!(listing.index.is_empty());
    }

    #[test]
    fn contiguous_entries_share_one_header() {
        let mut w = meta_writer();
        let entries = vec![
            entry(0, 0, 2, "a"),
            entry(0, 40, 3, "b"),
            entry(0, 80, 4, "c"),
        ];
        let listing = write_listing(&mut w, &entries).unwrap();
        // One 12-byte header + three entries of 8 + 1 name byte.
        assert_eq!(listing.size, 12 + 3 * 9);
    }

    #[test]
    fn chunk_change_starts_a_new_run() {
        let mut w = meta_writer();
        let entries = vec![entry(0, 0, 2, "a"), entry(8210, 4, 3, "b")];
        let listing = write_listing(&mut w, &entries).unwrap();
        // Two headers, two 9-byte entries.
        assert_eq!(listing.size, 2 * 12 + 2 * 9);
    }

    #[test]
    fn large_inode_delta_starts_a_new_run() {
        let mut w = meta_writer();
        let entries = vec![entry(0, 0, 2, "a"), entry(0, 40, 100_000, "b")];
        let listing = write_listing(&mut w, &entries).unwrap();
        assert_eq!(listing.size, 2 * 12 + 2 * 9);
    }

    #[test]
    fn runs_cap_at_256_entries() {
        let mut w = meta_writer();
        let entries: Vec<DirEntryInfo> = (0..300u32)
            .map(|i| entry(0, (i * 20) as u16, 2 + i, &format!("n{i:03}")))
            .collect();
        let listing = write_listing(&mut w, &entries).unwrap();
        // 300 entries of 8 + 4 name bytes, two headers.
        assert_eq!(listing.size, 2 * 12 + 300 * 12);
    }
}
