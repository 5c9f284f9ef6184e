//! Chunk-indexed lookup tables (fragments, ids, export) and the xattr
//! tables.

use std::io::{Seek, SeekFrom, Write};

use blocks::FragmentEntry;
use compress::BlockCompressor;
use fstree::XattrTable;
use tracing::debug;

use crate::metadata::{MetaWriter, CHUNK_UNCOMPRESSED, METADATA_CHUNK};
use crate::ImageError;

/// Serializes one metadata chunk (header + payload) for table storage.
fn encode_chunk(
    data: &[u8],
    compressor: &BlockCompressor,
    compress: bool,
) -> Result<Vec<u8>, ImageError> {
    let mut scratch = Vec::new();
    let encoded = if compress {
        compressor.compress(data, &mut scratch)?
    } else {
        None
    };
    let mut chunk = Vec::with_capacity(2 + data.len());
    match encoded {
        Some(len) => {
            chunk.extend_from_slice(&(len as u16).to_le_bytes());
            chunk.extend_from_slice(&scratch[..len]);
        }
        None => {
            chunk.extend_from_slice(&(data.len() as u16 | CHUNK_UNCOMPRESSED).to_le_bytes());
            chunk.extend_from_slice(data);
        }
    }
    Ok(chunk)
}

/// Writes entry bytes as 8 KiB metadata chunks followed by an uncompressed
/// index of absolute chunk offsets; returns the index offset (what the
/// superblock points at).
pub(crate) fn write_lookup_table<W: Write + Seek>(
    out: &mut W,
    at: &mut u64,
    entries: &[u8],
    compressor: &BlockCompressor,
    compress: bool,
) -> Result<u64, ImageError> {
    let mut chunk_offsets = Vec::new();
    for chunk in entries.chunks(METADATA_CHUNK) {
        let encoded = encode_chunk(chunk, compressor, compress)?;
        chunk_offsets.push(*at);
        out.seek(SeekFrom::Start(*at))?;
        out.write_all(&encoded)?;
        *at += encoded.len() as u64;
    }

    let table_start = *at;
    out.seek(SeekFrom::Start(table_start))?;
    for offset in &chunk_offsets {
        out.write_all(&offset.to_le_bytes())?;
    }
    *at += chunk_offsets.len() as u64 * 8;
    Ok(table_start)
}

/// Serializes the fragment table entries.
pub(crate) fn fragment_entries(fragments: &[FragmentEntry]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(fragments.len() * 16);
    for fragment in fragments {
        bytes.extend_from_slice(&fragment.start.to_le_bytes());
        bytes.extend_from_slice(&fragment.size_word().to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
    }
    bytes
}

/// Serializes the id table entries.
pub(crate) fn id_entries(ids: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(ids.len() * 4);
    for id in ids {
        bytes.extend_from_slice(&id.to_le_bytes());
    }
    bytes
}

/// Serializes the export table entries (inode references by inode number).
pub(crate) fn export_entries(refs: &[u64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(refs.len() * 8);
    for reference in refs {
        bytes.extend_from_slice(&reference.to_le_bytes());
    }
    bytes
}

/// Writes the two-stream xattr table and its header, returning the header
/// offset.
///
/// Key/value bodies go into one metadata stream; per-set
/// `(reference, count, size)` records go into a second; the header carries
/// the body stream's absolute offset, the set count, and the chunk index of
/// the record stream.
pub(crate) fn write_xattr_table<W: Write + Seek>(
    out: &mut W,
    at: &mut u64,
    xattrs: &XattrTable,
    compressor: &BlockCompressor,
    compress: bool,
) -> Result<u64, ImageError> {
    let mut kv_writer = MetaWriter::new(*compressor, compress);
    let mut id_records = Vec::with_capacity(xattrs.len() * 16);
    for set in xattrs.sets() {
        let reference = kv_writer.position();
        for pair in &set.pairs {
            kv_writer.write(&pair.ns.tag().to_le_bytes())?;
            kv_writer.write(&(pair.name.len() as u16).to_le_bytes())?;
            kv_writer.write(pair.name.as_bytes())?;
            kv_writer.write(&(pair.value.len() as u32).to_le_bytes())?;
            kv_writer.write(&pair.value)?;
        }
        id_records.extend_from_slice(&reference.encode().to_le_bytes());
        id_records.extend_from_slice(&(set.pairs.len() as u32).to_le_bytes());
        id_records.extend_from_slice(&set.serialized_size().to_le_bytes());
    }

    let kv_start = *at;
    let kv_stream = kv_writer.finish()?;
    out.seek(SeekFrom::Start(*at))?;
    out.write_all(&kv_stream)?;
    *at += kv_stream.len() as u64;

    let mut chunk_offsets = Vec::new();
    for chunk in id_records.chunks(METADATA_CHUNK) {
        let encoded = encode_chunk(chunk, compressor, compress)?;
        chunk_offsets.push(*at);
        out.seek(SeekFrom::Start(*at))?;
        out.write_all(&encoded)?;
        *at += encoded.len() as u64;
    }

    let table_start = *at;
    out.seek(SeekFrom::Start(table_start))?;
    let mut header = Vec::with_capacity(16 + chunk_offsets.len() * 8);
    header.extend_from_slice(&kv_start.to_le_bytes());
    header.extend_from_slice(&(xattrs.len() as u32).to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    for offset in &chunk_offsets {
        header.extend_from_slice(&offset.to_le_bytes());
    }
    out.write_all(&header)?;
    *at += header.len() as u64;

    debug!(sets = xattrs.len(), table_start, "xattr table written");
    Ok(table_start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use compress::Codec;
    use std::io::Cursor;

    fn compressor() -> BlockCompressor {
        BlockCompressor::new(Codec::Gzip).unwrap()
    }

    #[test]
    fn lookup_table_layout() {
        let mut out = Cursor::new(Vec::new());
        let mut at = 100u64;
        // 3000 u32 entries: 12000 bytes, two chunks.
        let entries = id_entries(&(0..3000u32).collect::<Vec<_>>());
        let table_start = write_lookup_table(&mut out, &mut at, &entries, &compressor(), true).unwrap();

        let bytes = out.into_inner();
        // The index holds two offsets, the first pointing at 100.
        assert_eq!(at, table_start + 16);
        let first = u64::from_le_bytes(bytes[table_start as usize..][..8].try_into().unwrap());
        assert_eq!(first, 100);
        let second = u64::from_le_bytes(bytes[table_start as usize + 8..][..8].try_into().unwrap());
        assert!(second > first && second < table_start);
    }

    #[test]
    fn fragment_entries_are_16_bytes() {
        let entries = fragment_entries(&[FragmentEntry { start: 96, stored: 17, compressed: true }]);
        assert_eq!(entries.len(), 16);
        assert_eq!(u64::from_le_bytes(entries[0..8].try_into().unwrap()), 96);
        assert_eq!(u32::from_le_bytes(entries[8..12].try_into().unwrap()), 17);
        assert_eq!(u32::from_le_bytes(entries[12..16].try_into().unwrap()), 0);
    }

    #[test]
    fn xattr_header_points_at_the_kv_stream() {
        use fstree::XattrBuilder;

        let mut xattrs = XattrTable::new();
        let mut builder = XattrBuilder::begin();
        builder.add("user.a", b"1").unwrap();
        builder.end(&mut xattrs).unwrap();

        let mut out = Cursor::new(Vec::new());
        let mut at = 500u64;
        let table_start =
            write_xattr_table(&mut out, &mut at, &xattrs, &compressor(), true).unwrap();

        let bytes = out.into_inner();
        let kv_start = u64::from_le_bytes(bytes[table_start as usize..][..8].try_into().unwrap());
        assert_eq!(kv_start, 500);
        let ids = u32::from_le_bytes(bytes[table_start as usize + 8..][..4].try_into().unwrap());
        assert_eq!(ids, 1);
    }
}
