//! Cross-process advisory locks on segment files.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

/// An advisory lock bound to one segment file.
///
/// Appenders block on [`FileLock::lock`]; readers probe with
/// [`FileLock::try_lock`] so a live segment held by a producer is detected
/// rather than waited on. The lock is an exclusive resource of its owner:
/// it is given up through [`FileLock::unlock`] and its descriptor freed
/// through [`FileLock::destroy`], never through a finalizer.
#[derive(Debug)]
pub(crate) struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Obtain a handle on the lock for `path`. The file must already exist;
    /// the handle holds its own descriptor, independent of any descriptor
    /// the caller uses for reading or writing.
    pub(crate) fn new(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Block until the lock is acquired.
    pub(crate) fn lock(&self) -> io::Result<()> {
        self.file.lock_exclusive()
    }

    /// Acquire without blocking; fails with `WouldBlock` while another
    /// process holds the lock.
    pub(crate) fn try_lock(&self) -> io::Result<()> {
        self.file.try_lock_exclusive()
    }

    /// Release the lock.
    pub(crate) fn unlock(&self) -> io::Result<()> {
        // Fully qualified: std's `File::unlock` shadows the fs2 method.
        fs2::FileExt::unlock(&self.file)
    }

    /// Free the descriptor backing this handle.
    pub(crate) fn destroy(self) {
        drop(self.file);
    }

    /// The segment file this lock is bound to.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_handle_observes_held_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment");
        File::create(&path).unwrap();

        let first = FileLock::new(&path).unwrap();
        first.lock().unwrap();

        let second = FileLock::new(&path).unwrap();
        let err = second.try_lock().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        first.unlock().unwrap();
        second.try_lock().unwrap();
        second.unlock().unwrap();
        first.destroy();
        second.destroy();
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(FileLock::new(&dir.path().join("absent")).is_err());
    }
}
