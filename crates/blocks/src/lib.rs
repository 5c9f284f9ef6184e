#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `blocks` turns whole-file byte streams into the data region of a SquashFS
//! image: fixed-size blocks compressed on a worker pool, small file tails
//! packed into shared fragment blocks, all-zero blocks collapsed into sparse
//! descriptors, and identical output elided through a signature index.
//!
//! # Design
//!
//! A single producer (the caller's thread) splits each submitted stream into
//! `block_size` chunks and hands them to *N* worker threads over a bounded
//! [`std::sync::mpsc::sync_channel`]; the bound is the backpressure limit.
//! Workers compress into their own scratch buffers and report completions
//! tagged with a monotonically increasing sequence id. The producer drains
//! completions **in submission order**, so every byte lands at an offset that
//! is a pure function of inputs and configuration — worker count and
//! scheduling never show through. With `workers = 0` the same code paths run
//! inline, which the test suite uses to pin down parity.
//!
//! # Invariants
//!
//! - A file's block descriptors appear in submission order; across files,
//!   bodies appear in submission order; fragments are numbered in flush
//!   order.
//! - A file's stored blocks are contiguous on disk (the inode block list
//!   only records sizes), which is what makes whole-file deduplication a
//!   rewind of the write position.
//! - The first worker error wins; later completions are discarded and
//!   [`Processor::finish`] surfaces that error.

mod dedup;
mod desc;
mod error;
mod fragment;
mod processor;

pub use desc::{BlockDesc, FragmentEntry, FragmentRef, PackResult, PackedFile};
pub use error::PackError;
pub use processor::{PackConfig, Processor};

/// Returns the worker count to use when the caller does not pin one:
/// the host's available parallelism, floored at 1.
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}
