//! Wire-level compression codec identifiers.

use core::fmt;
use core::ops::RangeInclusive;
use core::str::FromStr;

use thiserror::Error;

/// Compression codecs defined by the SquashFS 4.0 superblock.
///
/// All six ids are recognized so a reader can name what it found; only the
/// codecs with a backend in this build can be produced. Discriminants match
/// the on-disk `compression` field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum Codec {
    /// Deflate in a zlib container (the historical default).
    Gzip = 1,
    /// LZMA1 (legacy images only; never produced).
    Lzma = 2,
    /// LZO (legacy images only; never produced).
    Lzo = 3,
    /// XZ / LZMA2 (recognized, no backend in this build).
    Xz = 4,
    /// LZ4 block compression.
    Lz4 = 5,
    /// Zstandard.
    Zstd = 6,
}

impl Codec {
    /// Returns the superblock id for this codec.
    #[must_use]
    pub const fn id(self) -> u16 {
        self as u16
    }

    /// Looks a codec up by its superblock id.
    #[must_use]
    pub const fn from_id(id: u16) -> Option<Self> {
        match id {
            1 => Some(Self::Gzip),
            2 => Some(Self::Lzma),
            3 => Some(Self::Lzo),
            4 => Some(Self::Xz),
            5 => Some(Self::Lz4),
            6 => Some(Self::Zstd),
            _ => None,
        }
    }

    /// Canonical lowercase name used in diagnostics and option parsing.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Lzma => "lzma",
            Self::Lzo => "lzo",
            Self::Xz => "xz",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }

    /// Whether this build carries an encoder for the codec.
    #[must_use]
    pub const fn is_available(self) -> bool {
        match self {
            Self::Gzip => true,
            #[cfg(feature = "lz4")]
            Self::Lz4 => true,
            #[cfg(feature = "zstd")]
            Self::Zstd => true,
            _ => false,
        }
    }

    /// Default compression level, matching the conventional tool defaults.
    #[must_use]
    pub const fn default_level(self) -> u32 {
        match self {
            Self::Gzip => 9,
            Self::Zstd => 15,
            // Level-less codecs accept only 0.
            _ => 0,
        }
    }

    /// Inclusive range of accepted levels.
    #[must_use]
    pub const fn level_range(self) -> RangeInclusive<u32> {
        match self {
            Self::Gzip => 1..=9,
            Self::Zstd => 1..=22,
            _ => 0..=0,
        }
    }

    /// Returns the codecs that can be produced by this build.
    #[must_use]
    pub fn available() -> &'static [Codec] {
        #[cfg(all(feature = "zstd", feature = "lz4"))]
        {
            &[Codec::Gzip, Codec::Lz4, Codec::Zstd]
        }
        #[cfg(all(feature = "zstd", not(feature = "lz4")))]
        {
            &[Codec::Gzip, Codec::Zstd]
        }
        #[cfg(all(feature = "lz4", not(feature = "zstd")))]
        {
            &[Codec::Gzip, Codec::Lz4]
        }
        #[cfg(all(not(feature = "zstd"), not(feature = "lz4")))]
        {
            &[Codec::Gzip]
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::Gzip
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown codec name.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("unsupported compression codec: {input}")]
pub struct CodecParseError {
    input: String,
}

impl CodecParseError {
    /// Creates a parse error capturing the original input.
    #[must_use]
    pub fn new(input: impl Into<String>) -> Self {
        Self { input: input.into() }
    }

    /// Returns the invalid input.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl FromStr for Codec {
    type Err = CodecParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gzip" | "zlib" => Ok(Self::Gzip),
            "lzma" => Ok(Self::Lzma),
            "lzo" => Ok(Self::Lzo),
            "xz" => Ok(Self::Xz),
            "lz4" => Ok(Self::Lz4),
            "zstd" => Ok(Self::Zstd),
            other => Err(CodecParseError::new(other)),
        }
    }
}
