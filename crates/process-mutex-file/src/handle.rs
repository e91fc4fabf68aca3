//! Release handle for a held process mutex.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, instrument, warn};

use process_mutex_core::error::{LockError, LockResult};
use process_mutex_core::traits::LockHandle;

/// Handle for a held process mutex.
///
/// Releasing deletes the lock file. Release is idempotent and also happens on
/// drop, so a panic or a cancelled future inside the critical section still
/// frees the lock.
#[derive(Debug)]
pub struct MultiProcessMutexHandle {
    /// Path to the lock file.
    path: PathBuf,
    /// Set by the first release, explicit or on drop.
    released: AtomicBool,
}

impl MultiProcessMutexHandle {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: AtomicBool::new(false),
        }
    }

    /// Deletes the lock file unless this handle was already released.
    pub fn release_now(&self) -> LockResult<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        remove_lock_file(&self.path)
    }
}

/// Deletes a lock file, treating an already missing file as released.
pub(crate) fn remove_lock_file(path: &Path) -> LockResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(lock.path = %path.display(), "lock file already gone on release");
            Ok(())
        }
        Err(e) => Err(LockError::system(path, e)),
    }
}

impl LockHandle for MultiProcessMutexHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    #[instrument(skip(self), fields(lock.path = %self.path.display(), backend = "file"))]
    async fn release(&self) -> LockResult<()> {
        self.release_now()
    }
}

impl Drop for MultiProcessMutexHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release_now() {
            warn!(lock.path = %self.path.display(), error = %e, "failed to release lock on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn second_release_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("held.lock");
        fs::write(&path, "{}").unwrap();

        let handle = MultiProcessMutexHandle::new(path.clone());
        handle.release().await.unwrap();
        assert!(!path.exists());
        assert!(handle.is_released());

        // Someone else now holds a lock at the same path; a repeated release
        // must not delete it.
        fs::write(&path, "{}").unwrap();
        handle.release().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn release_of_missing_file_succeeds() {
        let dir = TempDir::new().unwrap();
        let handle = MultiProcessMutexHandle::new(dir.path().join("gone.lock"));
        handle.release().await.unwrap();
    }

    #[test]
    fn drop_releases_the_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dropped.lock");
        fs::write(&path, "{}").unwrap();

        drop(MultiProcessMutexHandle::new(path.clone()));
        assert!(!path.exists());
    }
}
