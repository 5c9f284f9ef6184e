//! Error type for the block pipeline.

use std::io;

use thiserror::Error;

/// Errors surfaced by [`crate::Processor`].
#[derive(Debug, Error)]
pub enum PackError {
    /// Reading an input stream or writing the data region failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// A compression worker reported a codec failure.
    #[error(transparent)]
    Compress(#[from] compress::CompressError),
    /// Block size outside the 4 KiB..=1 MiB power-of-two range.
    #[error("invalid block size {size}")]
    BlockSize {
        /// The rejected size.
        size: u32,
    },
    /// The fragment table outgrew its 32-bit index space.
    #[error("fragment count exceeds {limit}")]
    FragmentOverflow {
        /// Maximum representable fragment count.
        limit: u32,
    },
    /// A worker thread panicked; the pipeline state is unrecoverable.
    #[error("compression worker panicked")]
    WorkerPanicked,
    /// An earlier error already terminated the pipeline.
    #[error("block pipeline already terminated by an earlier error")]
    Aborted,
}
