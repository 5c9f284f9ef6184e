//! Transparent decompression of input files, detected from magic bytes.
//!
//! The image builder can consume file bodies that are themselves gzip or
//! zstd compressed on the host; the packing pipeline only ever sees the
//! decoded byte stream. Detection looks at the first four bytes and falls
//! back to a plain passthrough for everything else.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use flate2::read::MultiGzDecoder;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
#[cfg(feature = "zstd")]
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// A file body opened for packing, decoded if a known magic was found.
pub enum InputStream {
    /// Uncompressed passthrough.
    Plain(BufReader<File>),
    /// gzip-compressed input.
    Gzip(Box<MultiGzDecoder<BufReader<File>>>),
    /// zstd-compressed input.
    #[cfg(feature = "zstd")]
    Zstd(Box<zstd::stream::read::Decoder<'static, BufReader<File>>>),
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(r) => r.read(buf),
            Self::Gzip(r) => r.read(buf),
            #[cfg(feature = "zstd")]
            Self::Zstd(r) => r.read(buf),
        }
    }
}

/// Opens `path` for packing in a single call, returning the byte stream and
/// the size when it is knowable up front.
///
/// With `transparent` set, gzip and zstd payloads are decoded on the fly; the
/// decoded size is unknown until the stream is drained, so `None` is returned
/// for it.
///
/// # Errors
///
/// Any I/O failure from opening or probing the file; callers attach the
/// path.
pub fn open_for_reading(
    path: &Path,
    transparent: bool,
) -> io::Result<(InputStream, Option<u64>)> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    if !transparent {
        return Ok((InputStream::Plain(BufReader::new(file)), Some(size)));
    }

    let mut magic = [0u8; 4];
    let got = read_probe(&mut file, &mut magic)?;
    file.seek(SeekFrom::Start(0))?;
    let reader = BufReader::new(file);

    if got >= 2 && magic[..2] == GZIP_MAGIC {
        return Ok((InputStream::Gzip(Box::new(MultiGzDecoder::new(reader))), None));
    }
    #[cfg(feature = "zstd")]
    if got == 4 && magic == ZSTD_MAGIC {
        let decoder = zstd::stream::read::Decoder::with_buffer(reader)?;
        return Ok((InputStream::Zstd(Box::new(decoder)), None));
    }
    Ok((InputStream::Plain(reader), Some(size)))
}

fn read_probe(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
