//! Error type shared by the compression backends.

use std::io;

use thiserror::Error;

use crate::Codec;

/// Errors surfaced by [`crate::BlockCompressor`] and the sniffing reader.
#[derive(Debug, Error)]
pub enum CompressError {
    /// The backing encoder reported a failure.
    #[error("{codec} compression failed: {source}")]
    Compress {
        /// Codec that was encoding.
        codec: Codec,
        /// Underlying diagnostic.
        source: io::Error,
    },
    /// The backing decoder reported malformed input.
    #[error("{codec} decompression failed: {source}")]
    Decompress {
        /// Codec that was decoding.
        codec: Codec,
        /// Underlying diagnostic.
        source: io::Error,
    },
    /// A decoded block exceeded the caller's size limit.
    #[error("decompressed block exceeds {limit} bytes")]
    BlockTooLarge {
        /// The limit that was exceeded.
        limit: usize,
    },
    /// The codec id is recognized but this build carries no encoder for it.
    #[error("compression codec {0} is not enabled in this build")]
    Unsupported(Codec),
    /// The requested level is outside the codec's accepted range.
    #[error("{codec} does not accept compression level {level}")]
    Level {
        /// Codec the level was meant for.
        codec: Codec,
        /// The rejected level.
        level: u32,
    },
}
