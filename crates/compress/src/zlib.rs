//! zlib-container block compression (the on-disk "gzip" codec).
//!
//! SquashFS stores deflate payloads inside the zlib wrapper (2-byte header
//! plus Adler-32 trailer), matching `deflateInit()` rather than a raw
//! deflate stream. Blocks are bounded by the filesystem block size, so the
//! one-shot [`flate2::Compress`] interface is used with a destination capped
//! at the source length: running out of room before `StreamEnd` is exactly
//! the "incompressible, store raw" signal.

use std::io::{self, Read};

use flate2::read::ZlibDecoder;
use flate2::{Compress, Compression, FlushCompress, Status};

use crate::{Codec, CompressError};

/// Compresses one block into `dst`, returning `None` when the encoded form
/// would not be smaller than `src`.
pub(crate) fn compress_block(
    src: &[u8],
    dst: &mut Vec<u8>,
    level: u32,
) -> Result<Option<usize>, CompressError> {
    dst.resize(src.len(), 0);
    let mut encoder = Compress::new(Compression::new(level), true);
    loop {
        let consumed = usize::try_from(encoder.total_in()).unwrap_or(usize::MAX);
        let produced = usize::try_from(encoder.total_out()).unwrap_or(usize::MAX);
        if produced >= dst.len() {
            // Output filled up before the stream ended: storing raw is smaller.
            return Ok(None);
        }
        let status = encoder
            .compress(&src[consumed..], &mut dst[produced..], FlushCompress::Finish)
            .map_err(|e| CompressError::Compress {
                codec: Codec::Gzip,
                source: io::Error::other(e),
            })?;
        match status {
            Status::StreamEnd => {
                let produced = usize::try_from(encoder.total_out()).unwrap_or(usize::MAX);
                if produced < src.len() {
                    dst.truncate(produced);
                    return Ok(Some(produced));
                }
                return Ok(None);
            }
            Status::Ok => {}
            Status::BufError => return Ok(None),
        }
    }
}

/// Decompresses one block into `dst`, enforcing `limit` on the decoded size.
pub(crate) fn decompress_block(
    src: &[u8],
    dst: &mut Vec<u8>,
    limit: usize,
) -> Result<usize, CompressError> {
    let mut decoder = ZlibDecoder::new(src);
    let n = read_limited(&mut decoder, dst, limit, Codec::Gzip)?;
    Ok(n)
}

/// Reads a decoder to completion into `dst`, failing once `limit` is passed.
pub(crate) fn read_limited<R: Read>(
    decoder: &mut R,
    dst: &mut Vec<u8>,
    limit: usize,
    codec: Codec,
) -> Result<usize, CompressError> {
    let mut taken = decoder.take(limit as u64 + 1);
    taken
        .read_to_end(dst)
        .map_err(|source| CompressError::Decompress { codec, source })?;
    if dst.len() > limit {
        return Err(CompressError::BlockTooLarge { limit });
    }
    Ok(dst.len())
}
