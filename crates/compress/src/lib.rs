#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `compress` exposes the compression primitives shared across the SquashFS
//! writer workspace. The block processor and the metadata-table writer both
//! funnel their payloads through [`BlockCompressor`], so a single codec
//! selection governs data blocks, fragment blocks, and the compressed
//! metadata streams alike.
//!
//! # Design
//!
//! The crate wraps [`flate2`](https://docs.rs/flate2) for the zlib container
//! (the on-disk "gzip" codec), [`lz4_flex`](https://docs.rs/lz4_flex) block
//! mode, and [`zstd`](https://docs.rs/zstd) behind one enum-dispatched
//! compressor. Callers provide the destination buffer; the compressor never
//! retains state between calls, which keeps it shareable across worker
//! threads and guarantees deterministic output for a fixed input.
//!
//! # Invariants
//!
//! - [`BlockCompressor::compress`] returns `Ok(None)` when the encoded form
//!   would not be strictly smaller than the source; the caller stores the
//!   raw bytes in that case.
//! - Compression is a pure function of `(codec, level, input)`. No timestamps
//!   or per-call state leak into the output.
//! - Decompression enforces a caller-supplied output limit and fails rather
//!   than allocating past it.
//!
//! # Errors
//!
//! Fallible operations return [`CompressError`], which wraps the underlying
//! codec diagnostics and names the codec involved.

mod codec;
mod error;
pub mod sniff;
mod zlib;

#[cfg(feature = "lz4")]
mod lz4;
#[cfg(feature = "zstd")]
mod zstd_codec;

pub use codec::{Codec, CodecParseError};
pub use error::CompressError;

/// Stateless block compressor selected by [`Codec`] and level.
///
/// One instance is shared by every compression worker; each call reads the
/// source slice and fills the caller's destination buffer.
#[derive(Clone, Copy, Debug)]
pub struct BlockCompressor {
    codec: Codec,
    level: u32,
}

impl BlockCompressor {
    /// Creates a compressor for `codec` at its default level.
    ///
    /// # Errors
    ///
    /// Returns [`CompressError::Unsupported`] when the codec has no backend
    /// in this build (lzma, lzo, and xz ids are recognized on the wire but
    /// never produced).
    pub fn new(codec: Codec) -> Result<Self, CompressError> {
        Self::with_level(codec, codec.default_level())
    }

    /// Creates a compressor with an explicit level.
    ///
    /// # Errors
    ///
    /// Returns [`CompressError::Unsupported`] for codecs without a backend
    /// and [`CompressError::Level`] when `level` is outside the codec's
    /// accepted range.
    pub fn with_level(codec: Codec, level: u32) -> Result<Self, CompressError> {
        if !codec.is_available() {
            return Err(CompressError::Unsupported(codec));
        }
        let range = codec.level_range();
        if !range.contains(&level) {
            return Err(CompressError::Level { codec, level });
        }
        Ok(Self { codec, level })
    }

    /// Returns the codec this compressor encodes with.
    #[must_use]
    pub const fn codec(&self) -> Codec {
        self.codec
    }

    /// Returns the configured compression level.
    #[must_use]
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// Compresses `src` into `dst`, replacing its contents.
    ///
    /// Returns `Ok(Some(len))` when the encoded form is strictly smaller
    /// than `src`, `Ok(None)` when the block is incompressible and should be
    /// stored raw.
    ///
    /// # Errors
    ///
    /// Returns [`CompressError::Compress`] when the backing codec reports a
    /// failure (corrupt internal state, allocation failure in the backend).
    pub fn compress(&self, src: &[u8], dst: &mut Vec<u8>) -> Result<Option<usize>, CompressError> {
        dst.clear();
        if src.is_empty() {
            return Ok(None);
        }
        match self.codec {
            Codec::Gzip => zlib::compress_block(src, dst, self.level),
            #[cfg(feature = "lz4")]
            Codec::Lz4 => lz4::compress_block(src, dst),
            #[cfg(feature = "zstd")]
            Codec::Zstd => zstd_codec::compress_block(src, dst, self.level),
            other => Err(CompressError::Unsupported(other)),
        }
    }

    /// Decompresses `src` into `dst`, replacing its contents.
    ///
    /// `limit` bounds the decoded size; a block that inflates past it is
    /// reported as corrupt rather than ballooning memory.
    ///
    /// # Errors
    ///
    /// Returns [`CompressError::Decompress`] for malformed input and
    /// [`CompressError::BlockTooLarge`] when the decoded form exceeds
    /// `limit`.
    pub fn decompress(
        &self,
        src: &[u8],
        dst: &mut Vec<u8>,
        limit: usize,
    ) -> Result<usize, CompressError> {
        dst.clear();
        match self.codec {
            Codec::Gzip => zlib::decompress_block(src, dst, limit),
            #[cfg(feature = "lz4")]
            Codec::Lz4 => lz4::decompress_block(src, dst, limit),
            #[cfg(feature = "zstd")]
            Codec::Zstd => zstd_codec::decompress_block(src, dst, limit),
            other => Err(CompressError::Unsupported(other)),
        }
    }
}
