//! Named process mutexes inside one directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use process_mutex_core::backoff::{DEFAULT_INITIAL_POLL_INTERVAL, DEFAULT_TIMEOUT};
use process_mutex_core::error::{LockError, LockResult};
use process_mutex_core::traits::LockProvider;

use crate::lock::MultiProcessMutex;
use crate::name::lock_file_path;

/// Builder for [`MultiProcessMutexProvider`] configuration.
pub struct MultiProcessMutexProviderBuilder {
    directory: Option<PathBuf>,
    timeout: Duration,
    initial_poll_interval: Duration,
}

impl MultiProcessMutexProviderBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            directory: None,
            timeout: DEFAULT_TIMEOUT,
            initial_poll_interval: DEFAULT_INITIAL_POLL_INTERVAL,
        }
    }

    /// Sets the directory for lock files.
    ///
    /// The directory will be created if it doesn't exist.
    pub fn directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.directory = Some(path.into());
        self
    }

    /// Sets the acquisition timeout of every lock created by the provider.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the initial poll interval of every lock created by the provider.
    pub fn initial_poll_interval(mut self, interval: Duration) -> Self {
        self.initial_poll_interval = interval;
        self
    }

    /// Builds the provider.
    ///
    /// # Errors
    ///
    /// Returns an error if no directory is specified or if the directory
    /// cannot be created.
    pub fn build(self) -> LockResult<MultiProcessMutexProvider> {
        let directory = self
            .directory
            .ok_or_else(|| LockError::InvalidPath(PathBuf::new()))?;

        std::fs::create_dir_all(&directory).map_err(|e| LockError::system(&directory, e))?;
        let directory = directory
            .canonicalize()
            .map_err(|e| LockError::system(&directory, e))?;

        Ok(MultiProcessMutexProvider {
            directory,
            timeout: self.timeout,
            initial_poll_interval: self.initial_poll_interval,
        })
    }
}

impl Default for MultiProcessMutexProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider for process mutexes identified by name.
///
/// Every name maps to one lock file in the provider's directory, so two
/// processes configured with the same directory and name contend for the
/// same lock.
#[derive(Debug, Clone)]
pub struct MultiProcessMutexProvider {
    directory: PathBuf,
    timeout: Duration,
    initial_poll_interval: Duration,
}

impl MultiProcessMutexProvider {
    /// Returns a new builder for configuring the provider.
    pub fn builder() -> MultiProcessMutexProviderBuilder {
        MultiProcessMutexProviderBuilder::new()
    }

    /// Creates a provider using the specified directory and default timings.
    pub fn new(directory: impl Into<PathBuf>) -> LockResult<Self> {
        Self::builder().directory(directory).build()
    }

    /// Returns the absolute directory where lock files are stored.
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl LockProvider for MultiProcessMutexProvider {
    type Lock = MultiProcessMutex;

    fn create_lock(&self, name: &str) -> LockResult<Self::Lock> {
        MultiProcessMutex::builder(lock_file_path(&self.directory, name)?)
            .timeout(self.timeout)
            .initial_poll_interval(self.initial_poll_interval)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn build_requires_directory() {
        let result = MultiProcessMutexProvider::builder().build();
        assert!(matches!(result, Err(LockError::InvalidPath(_))));
    }

    #[test]
    fn build_creates_and_canonicalizes_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("locks").join("inner");
        let provider = MultiProcessMutexProvider::new(&nested).unwrap();

        assert!(provider.directory().is_absolute());
        assert!(provider.directory().is_dir());
        assert!(provider.directory().ends_with("locks/inner"));
    }

    #[test]
    fn locks_inherit_provider_timings() {
        let dir = TempDir::new().unwrap();
        let provider = MultiProcessMutexProvider::builder()
            .directory(dir.path())
            .timeout(Duration::from_millis(750))
            .initial_poll_interval(Duration::from_millis(15))
            .build()
            .unwrap();

        let lock = provider.create_lock("compile-cache").unwrap();
        assert_eq!(lock.timeout(), Duration::from_millis(750));
        assert_eq!(lock.initial_poll_interval(), Duration::from_millis(15));
        assert_eq!(lock.path().parent(), Some(provider.directory()));
    }

    #[test]
    fn same_name_maps_to_same_file() {
        let dir = TempDir::new().unwrap();
        let provider = MultiProcessMutexProvider::new(dir.path()).unwrap();
        let a = provider.create_lock("shared").unwrap();
        let b = provider.create_lock("shared").unwrap();
        assert_eq!(a.path(), b.path());
    }

    #[test]
    fn empty_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let provider = MultiProcessMutexProvider::new(dir.path()).unwrap();
        assert!(matches!(
            provider.create_lock(""),
            Err(LockError::InvalidPath(_))
        ));
    }
}
