//! Signature index for eliding duplicate output.
//!
//! Candidates are keyed by `(length, xxh32)` over the stored bytes. A hit is
//! only a candidate: the caller reads the stored region back and
//! byte-compares before reusing an offset, so hash collisions cost a read,
//! never correctness.

use std::io::{Read, Seek, SeekFrom};

use rustc_hash::FxHashMap;
use xxhash_rust::xxh32::xxh32;

use crate::PackError;

/// Signature of a stored byte run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) struct Signature {
    pub(crate) len: u64,
    pub(crate) hash: u32,
}

impl Signature {
    pub(crate) fn of(bytes: &[u8]) -> Self {
        Self { len: bytes.len() as u64, hash: xxh32(bytes, 0) }
    }
}

/// A previously emitted run.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Candidate {
    pub(crate) start: u64,
    pub(crate) compressed: bool,
}

/// Index from signature to every run emitted under it.
#[derive(Debug, Default)]
pub(crate) struct DedupIndex {
    runs: FxHashMap<Signature, Vec<Candidate>>,
}

impl DedupIndex {
    pub(crate) fn candidates(&self, sig: Signature) -> &[Candidate] {
        self.runs.get(&sig).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn record(&mut self, sig: Signature, candidate: Candidate) {
        self.runs.entry(sig).or_default().push(candidate);
    }
}

/// Byte-compares a stored region against in-memory bytes.
pub(crate) fn region_matches<W: Read + Seek>(
    out: &mut W,
    start: u64,
    bytes: &[u8],
) -> Result<bool, PackError> {
    out.seek(SeekFrom::Start(start))?;
    let mut buf = [0u8; 8192];
    let mut checked = 0usize;
    while checked < bytes.len() {
        let want = (bytes.len() - checked).min(buf.len());
        out.read_exact(&mut buf[..want])?;
        if buf[..want] != bytes[checked..checked + want] {
            return Ok(false);
        }
        checked += want;
    }
    Ok(true)
}

/// Byte-compares two stored regions of equal length.
pub(crate) fn regions_match<W: Read + Seek>(
    out: &mut W,
    a: u64,
    b: u64,
    len: u64,
) -> Result<bool, PackError> {
    let mut buf_a = vec![0u8; 64 * 1024];
    let mut buf_b = vec![0u8; 64 * 1024];
    let mut offset = 0u64;
    while offset < len {
        let want = usize::try_from((len - offset).min(buf_a.len() as u64)).unwrap_or(buf_a.len());
        out.seek(SeekFrom::Start(a + offset))?;
        out.read_exact(&mut buf_a[..want])?;
        out.seek(SeekFrom::Start(b + offset))?;
        out.read_exact(&mut buf_b[..want])?;
        if buf_a[..want] != buf_b[..want] {
            return Ok(false);
        }
        offset += want as u64;
    }
    Ok(true)
}
