//! Error type for directory scanning.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while scanning a host directory tree.
#[derive(Debug, Error)]
pub enum WalkError {
    /// An underlying filesystem operation failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// Path the operation touched.
        path: PathBuf,
        /// Underlying diagnostic.
        source: io::Error,
    },
    /// A file name is not valid UTF-8 and cannot enter the tree.
    #[error("{}: file name is not valid UTF-8", path.display())]
    NonUnicodeName {
        /// Path of the offending entry.
        path: PathBuf,
    },
    /// The scan root is not a directory.
    #[error("{}: not a directory", path.display())]
    RootNotDirectory {
        /// The rejected root.
        path: PathBuf,
    },
}

impl WalkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
