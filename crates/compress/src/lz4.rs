//! LZ4 block compression.
//!
//! SquashFS stores bare LZ4 block payloads (no frame header); the reader
//! learns the uncompressed size from the block descriptor, so
//! [`lz4_flex::block`] maps onto the format directly.

use std::io;

use lz4_flex::block;

use crate::{Codec, CompressError};

pub(crate) fn compress_block(src: &[u8], dst: &mut Vec<u8>) -> Result<Option<usize>, CompressError> {
    dst.resize(block::get_maximum_output_size(src.len()), 0);
    let produced = block::compress_into(src, dst.as_mut_slice()).map_err(|e| {
        CompressError::Compress {
            codec: Codec::Lz4,
            source: io::Error::other(e),
        }
    })?;
    if produced < src.len() {
        dst.truncate(produced);
        Ok(Some(produced))
    } else {
        Ok(None)
    }
}

pub(crate) fn decompress_block(
    src: &[u8],
    dst: &mut Vec<u8>,
    limit: usize,
) -> Result<usize, CompressError> {
    let decoded = block::decompress(src, limit).map_err(|e| CompressError::Decompress {
        codec: Codec::Lz4,
        source: io::Error::other(e),
    })?;
    if decoded.len() > limit {
        return Err(CompressError::BlockTooLarge { limit });
    }
    *dst = decoded;
    Ok(dst.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let data = b"lz4 block payload ".repeat(100);
        let mut packed = Vec::new();
        compress_block(&data, &mut packed).unwrap().expect("compressible");
        let mut unpacked = Vec::new();
        decompress_block(&packed, &mut unpacked, data.len()).unwrap();
        assert_eq!(unpacked, data);
    }

    #[test]
    fn tiny_input_stores_raw() {
        // Two bytes can never shrink under LZ4 block framing.
        let mut packed = Vec::new();
        assert!(compress_block(b"ab", &mut packed).unwrap().is_none());
    }
}
