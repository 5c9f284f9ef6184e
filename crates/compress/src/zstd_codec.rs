//! Zstandard block compression.

use std::io;

use crate::{Codec, CompressError};

pub(crate) fn compress_block(
    src: &[u8],
    dst: &mut Vec<u8>,
    level: u32,
) -> Result<Option<usize>, CompressError> {
    // The destination is capped at the source length; a frame that does not
    // fit is the "store raw" signal, mirroring the zlib backend.
    dst.resize(src.len(), 0);
    match zstd::bulk::compress_to_buffer(src, dst.as_mut_slice(), level as i32) {
        Ok(produced) if produced < src.len() => {
            dst.truncate(produced);
            Ok(Some(produced))
        }
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::Other => Ok(None),
        Err(source) => Err(CompressError::Compress {
            codec: Codec::Zstd,
            source,
        }),
    }
}

pub(crate) fn decompress_block(
    src: &[u8],
    dst: &mut Vec<u8>,
    limit: usize,
) -> Result<usize, CompressError> {
    dst.resize(limit, 0);
    let n = zstd::bulk::decompress_to_buffer(src, dst.as_mut_slice()).map_err(|source| {
        CompressError::Decompress {
            codec: Codec::Zstd,
            source,
        }
    })?;
    dst.truncate(n);
    Ok(n)
}
