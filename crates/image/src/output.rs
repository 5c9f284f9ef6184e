//! Output-file lifetime: created up front, deleted on any failure path,
//! kept only after the superblock is stamped.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ImageError;

/// Guard deleting the partially written image unless committed.
#[derive(Debug)]
pub(crate) struct OutputGuard {
    path: PathBuf,
    armed: bool,
}

impl OutputGuard {
    /// Creates (truncating) the output file, returning the guard and the
    /// read-write handle the pipeline and writer share.
    pub(crate) fn create(path: &Path) -> Result<(Self, File), ImageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok((Self { path: path.to_path_buf(), armed: true }, file))
    }

    /// Keeps the finished image.
    pub(crate) fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if self.armed {
            debug!(path = %self.path.display(), "removing partial image");
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_guard_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.img");
        let (guard, _file) = OutputGuard::create(&path).unwrap();
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn committed_guard_keeps_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("done.img");
        let (guard, _file) = OutputGuard::create(&path).unwrap();
        guard.commit();
        assert!(path.exists());
    }
}
