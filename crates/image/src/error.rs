//! Error type for image building.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced while building an image.
#[derive(Debug, Error)]
pub enum ImageError {
    /// Writing or finalizing the output image failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Reading a file body failed; carries the offending path.
    #[error("{}: {source}", path.display())]
    InputIo {
        /// The file being packed.
        path: PathBuf,
        /// Underlying diagnostic.
        source: io::Error,
    },
    /// Tree construction or post-processing failed.
    #[error(transparent)]
    Tree(#[from] fstree::TreeError),
    /// The block pipeline failed.
    #[error(transparent)]
    Pack(#[from] blocks::PackError),
    /// A metadata stream failed to compress.
    #[error(transparent)]
    Compress(#[from] compress::CompressError),
    /// The pseudo-file description is malformed.
    #[error(transparent)]
    Pseudo(#[from] pseudo::PseudoError),
    /// A host directory scan failed.
    #[error(transparent)]
    Walk(#[from] walk::WalkError),
    /// An internal invariant was violated; the image would be corrupt.
    #[error("internal error: {0}")]
    Internal(&'static str),
}
