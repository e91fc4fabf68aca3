//! Hard-link based inter-process mutex.
//!
//! The existence of the lock file is the lock. A contender stages its
//! metadata in a uniquely named temp file and publishes it with a hard link,
//! which the filesystem creates atomically and refuses if the name exists.
//! A lock whose owner process is gone is removed by whichever contender
//! notices first.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use process_mutex_core::backoff::{Backoff, DEFAULT_INITIAL_POLL_INTERVAL, DEFAULT_TIMEOUT};
use process_mutex_core::error::{LockError, LockResult};
use process_mutex_core::traits::ProcessLock;
use tracing::field::Empty;
use tracing::{Span, debug, info, instrument};

use crate::handle::MultiProcessMutexHandle;
use crate::identity::local_identity;
use crate::liveness::{self, ProcessLiveness};
use crate::metadata::{LockMetadata, read_lock_metadata};
use crate::name::{temp_file_name, temp_file_pid};

/// Outcome of a single acquisition attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// The lock file was published by this process.
    Acquired,
    /// The lock could not be taken this time; back off before retrying.
    Contended,
    /// A stale lock was removed; retry right away.
    StaleReclaimed,
}

/// Outcome of staging and linking a new lock file.
enum Publish {
    Acquired,
    AlreadyExists,
    Retry,
}

/// A mutual exclusion lock shared by processes on one host through a lock file.
///
/// Not reentrant: acquiring a lock already held by the same process waits
/// until the timeout like any other contender.
#[derive(Debug, Clone)]
pub struct MultiProcessMutex {
    /// Absolute path of the lock file.
    path: PathBuf,
    /// Directory holding the lock file and its temp files.
    directory: PathBuf,
    /// Final component of `path`, used to build and recognize temp files.
    file_name: String,
    timeout: Duration,
    initial_poll_interval: Duration,
}

impl MultiProcessMutex {
    /// Creates a mutex for `path` with the default timeout and poll interval.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::InvalidPath`] if `path` is not absolute.
    pub fn new(path: impl Into<PathBuf>) -> LockResult<Self> {
        Self::builder(path).build()
    }

    /// Returns a builder for a mutex at `path`.
    pub fn builder(path: impl Into<PathBuf>) -> MultiProcessMutexBuilder {
        MultiProcessMutexBuilder::new(path)
    }

    /// Returns the lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns how long `acquire` waits for a live owner.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the first delay between attempts.
    pub fn initial_poll_interval(&self) -> Duration {
        self.initial_poll_interval
    }

    /// Runs one acquisition attempt.
    fn attempt(&self) -> LockResult<Attempt> {
        // An existing lock goes straight to staleness handling, which must
        // also work in directories where new files cannot be created.
        if !matches!(self.path.try_exists(), Ok(true)) {
            match self.publish()? {
                Publish::Acquired => {
                    self.clean_orphan_temp_files();
                    return Ok(Attempt::Acquired);
                }
                Publish::Retry => return Ok(Attempt::Contended),
                Publish::AlreadyExists => {}
            }
        }
        self.inspect_existing_lock()
    }

    /// Stages metadata in a temp file and hard-links it to the lock path.
    fn publish(&self) -> LockResult<Publish> {
        let metadata = LockMetadata::for_current_process();
        let json = metadata
            .to_json()
            .map_err(|e| LockError::system(&self.path, e))?;
        let temp_path = self.directory.join(temp_file_name(&self.file_name));

        if let Err(e) = write_new_file(&temp_path, json.as_bytes()) {
            return match e.kind() {
                ErrorKind::NotFound => self.create_directory(),
                ErrorKind::PermissionDenied => {
                    debug!(lock.path = %self.path.display(), error = %e, "permission denied staging lock");
                    Ok(Publish::Retry)
                }
                _ => {
                    // AlreadyExists lands here too: the temp file may belong
                    // to someone else, so it is left alone.
                    Err(LockError::system(&self.path, e))
                }
            };
        }

        let linked = fs::hard_link(&temp_path, &self.path);
        remove_best_effort(&temp_path);

        match linked {
            Ok(()) => Ok(Publish::Acquired),
            Err(e) => self.classify_link_error(e),
        }
    }

    /// Maps a failed hard link to the next protocol step.
    fn classify_link_error(&self, e: io::Error) -> LockResult<Publish> {
        match e.kind() {
            ErrorKind::AlreadyExists => Ok(Publish::AlreadyExists),
            ErrorKind::NotFound => self.create_directory(),
            _ if is_hard_link_unsupported(&e) => Err(LockError::system(
                &self.path,
                io::Error::new(
                    e.kind(),
                    format!("filesystem does not support hard links: {e}"),
                ),
            )),
            ErrorKind::PermissionDenied => {
                debug!(lock.path = %self.path.display(), error = %e, "permission denied publishing lock");
                Ok(Publish::Retry)
            }
            _ => Err(LockError::system(&self.path, e)),
        }
    }

    /// Creates the missing lock directory; the next attempt tries again.
    fn create_directory(&self) -> LockResult<Publish> {
        fs::create_dir_all(&self.directory).map_err(|e| LockError::system(&self.path, e))?;
        debug!(lock.directory = %self.directory.display(), "created lock directory");
        Ok(Publish::Retry)
    }

    /// Decides whether an existing lock is held, stale, or off limits.
    fn inspect_existing_lock(&self) -> LockResult<Attempt> {
        let Some(metadata) = read_lock_metadata(&self.path) else {
            debug!(lock.path = %self.path.display(), "lock has no valid metadata, treating as stale");
            return self.reclaim_stale(None);
        };

        let local = local_identity();
        if metadata.hostname != local.hostname {
            return Err(LockError::IncompatibleHostname {
                path: self.path.clone(),
                lock_hostname: metadata.hostname,
                local_hostname: local.hostname.clone(),
            });
        }
        if metadata.platform != local.platform {
            return Err(LockError::IncompatiblePlatform {
                path: self.path.clone(),
                lock_platform: metadata.platform,
                local_platform: local.platform.to_string(),
            });
        }
        if let (Some(lock_uid), Some(local_uid)) = (metadata.uid, local.uid)
            && lock_uid != local_uid
        {
            return Err(LockError::IncompatibleUid {
                path: self.path.clone(),
                lock_uid,
                local_uid,
            });
        }

        match liveness::probe(metadata.pid) {
            ProcessLiveness::Dead => {
                debug!(lock.path = %self.path.display(), pid = metadata.pid, "lock owner is gone");
                self.reclaim_stale(metadata.uid)
            }
            status => {
                debug!(lock.path = %self.path.display(), pid = metadata.pid, ?status, "lock is held");
                Ok(Attempt::Contended)
            }
        }
    }

    /// Deletes a lock proven stale.
    fn reclaim_stale(&self, uid: Option<u32>) -> LockResult<Attempt> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(lock.path = %self.path.display(), "removed stale lock");
                self.clean_orphan_temp_files();
                Ok(Attempt::StaleReclaimed)
            }
            Err(e) => self.classify_removal_error(e, uid),
        }
    }

    /// Maps a failed stale lock removal to the attempt outcome.
    fn classify_removal_error(&self, e: io::Error, uid: Option<u32>) -> LockResult<Attempt> {
        match e.kind() {
            // Another contender reclaimed it first.
            ErrorKind::NotFound => Ok(Attempt::StaleReclaimed),
            ErrorKind::PermissionDenied | ErrorKind::ResourceBusy => {
                Err(LockError::StaleRemovalFailed {
                    path: self.path.clone(),
                    uid,
                    source: e,
                })
            }
            _ => Err(LockError::system(&self.path, e)),
        }
    }

    /// Deletes temp files of this lock left behind by dead processes.
    ///
    /// Housekeeping only: every failure is logged and ignored.
    fn clean_orphan_temp_files(&self) {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(lock.directory = %self.directory.display(), error = %e, "cannot scan for orphan temp files");
                return;
            }
        };

        for entry in entries.flatten() {
            let entry_name = entry.file_name();
            let Some(pid) = entry_name
                .to_str()
                .and_then(|name| temp_file_pid(name, &self.file_name))
            else {
                continue;
            };
            if liveness::probe(pid).is_dead() {
                debug!(temp.path = %entry.path().display(), pid, "removing orphan temp file");
                remove_best_effort(&entry.path());
            }
        }
    }

    /// Attempts until acquired, a terminal error occurs, or the deadline passes.
    ///
    /// With `wait` unset, returns `None` at the first attempt that finds a
    /// live owner instead of sleeping.
    async fn acquire_internal(&self, wait: bool) -> LockResult<Option<MultiProcessMutexHandle>> {
        let start = Instant::now();
        let mut backoff = Backoff::new(self.initial_poll_interval);
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            let outcome = self.attempt()?;
            if outcome == Attempt::Acquired {
                Span::current().record("attempts", attempts);
                Span::current().record("elapsed_ms", start.elapsed().as_millis() as u64);
                return Ok(Some(MultiProcessMutexHandle::new(self.path.clone())));
            }
            if outcome == Attempt::Contended && !wait {
                Span::current().record("attempts", attempts);
                Span::current().record("elapsed_ms", start.elapsed().as_millis() as u64);
                return Ok(None);
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                Span::current().record("attempts", attempts);
                Span::current().record("elapsed_ms", elapsed.as_millis() as u64);
                return Err(LockError::Timeout {
                    path: self.path.clone(),
                    timeout: self.timeout,
                });
            }

            if outcome == Attempt::Contended {
                let delay = backoff.next_delay().min(self.timeout - elapsed);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

impl ProcessLock for MultiProcessMutex {
    type Handle = MultiProcessMutexHandle;

    fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(
        skip(self),
        fields(lock.path = %self.path.display(), timeout = ?self.timeout, backend = "file", attempts = Empty, elapsed_ms = Empty)
    )]
    async fn acquire(&self) -> LockResult<Self::Handle> {
        match self.acquire_internal(true).await? {
            Some(handle) => Ok(handle),
            None => Err(LockError::Timeout {
                path: self.path.clone(),
                timeout: self.timeout,
            }),
        }
    }

    #[instrument(
        skip(self),
        fields(lock.path = %self.path.display(), backend = "file", attempts = Empty, elapsed_ms = Empty)
    )]
    async fn try_acquire(&self) -> LockResult<Option<Self::Handle>> {
        self.acquire_internal(false).await
    }
}

/// Builder for [`MultiProcessMutex`] configuration.
#[derive(Debug, Clone)]
pub struct MultiProcessMutexBuilder {
    path: PathBuf,
    timeout: Duration,
    initial_poll_interval: Duration,
}

impl MultiProcessMutexBuilder {
    /// Creates a builder with the default timeout and poll interval.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: DEFAULT_TIMEOUT,
            initial_poll_interval: DEFAULT_INITIAL_POLL_INTERVAL,
        }
    }

    /// Sets how long `acquire` waits for a live owner to release the lock.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the first delay between attempts; later delays double up to 200ms.
    pub fn initial_poll_interval(mut self, interval: Duration) -> Self {
        self.initial_poll_interval = interval;
        self
    }

    /// Builds the mutex.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::InvalidPath`] if the path is relative or has no
    /// file name.
    pub fn build(self) -> LockResult<MultiProcessMutex> {
        if !self.path.is_absolute() {
            return Err(LockError::InvalidPath(self.path));
        }
        let (Some(directory), Some(file_name)) = (
            self.path.parent().map(Path::to_path_buf),
            self.path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string),
        ) else {
            return Err(LockError::InvalidPath(self.path));
        };

        Ok(MultiProcessMutex {
            path: self.path,
            directory,
            file_name,
            timeout: self.timeout,
            initial_poll_interval: self.initial_poll_interval,
        })
    }
}

/// Writes `contents` to a file that must not exist yet.
fn write_new_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let written = file.write_all(contents).and_then(|()| file.sync_all());
    if written.is_err() {
        remove_best_effort(path);
    }
    written
}

fn remove_best_effort(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != ErrorKind::NotFound
    {
        debug!(path = %path.display(), error = %e, "failed to remove temp file");
    }
}

/// Returns `true` for errors meaning the filesystem cannot create hard links at all.
fn is_hard_link_unsupported(err: &io::Error) -> bool {
    if err.kind() == ErrorKind::Unsupported {
        return true;
    }

    #[cfg(unix)]
    {
        err.raw_os_error().is_some_and(|code| {
            code == libc::EOPNOTSUPP || code == libc::ENOTSUP || code == libc::ENOSYS
        })
    }

    #[cfg(windows)]
    {
        use windows_sys::Win32::Foundation::{ERROR_INVALID_FUNCTION, ERROR_NOT_SUPPORTED};
        err.raw_os_error().is_some_and(|code| {
            code == ERROR_NOT_SUPPORTED as i32 || code == ERROR_INVALID_FUNCTION as i32
        })
    }

    #[cfg(not(any(unix, windows)))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn relative_path_is_rejected() {
        let result = MultiProcessMutex::new("locks/build.lock");
        assert!(matches!(result, Err(LockError::InvalidPath(p)) if p == Path::new("locks/build.lock")));
    }

    #[test]
    fn root_path_is_rejected() {
        let root = if cfg!(windows) { "C:\\" } else { "/" };
        assert!(matches!(
            MultiProcessMutex::new(root),
            Err(LockError::InvalidPath(_))
        ));
    }

    #[test]
    fn builder_applies_defaults_and_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.lock");

        let mutex = MultiProcessMutex::new(&path).unwrap();
        assert_eq!(mutex.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(mutex.initial_poll_interval(), DEFAULT_INITIAL_POLL_INTERVAL);

        let mutex = MultiProcessMutex::builder(&path)
            .timeout(Duration::from_secs(3))
            .initial_poll_interval(Duration::from_millis(20))
            .build()
            .unwrap();
        assert_eq!(mutex.timeout(), Duration::from_secs(3));
        assert_eq!(mutex.initial_poll_interval(), Duration::from_millis(20));
        assert_eq!(mutex.path(), path);
    }

    #[test]
    fn attempt_on_free_lock_acquires_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let mutex = MultiProcessMutex::new(dir.path().join("a.lock")).unwrap();

        assert_eq!(mutex.attempt().unwrap(), Attempt::Acquired);
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("a.lock")]);
    }

    #[test]
    fn attempt_on_own_live_lock_is_contended() {
        let dir = TempDir::new().unwrap();
        let mutex = MultiProcessMutex::new(dir.path().join("a.lock")).unwrap();

        assert_eq!(mutex.attempt().unwrap(), Attempt::Acquired);
        assert_eq!(mutex.attempt().unwrap(), Attempt::Contended);
    }

    #[test]
    fn attempt_on_garbage_lock_reclaims_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.lock");
        fs::write(&path, "{\"pid\":").unwrap();
        let mutex = MultiProcessMutex::new(&path).unwrap();

        assert_eq!(mutex.attempt().unwrap(), Attempt::StaleReclaimed);
        assert!(!path.exists());
        assert_eq!(mutex.attempt().unwrap(), Attempt::Acquired);
    }

    #[test]
    fn missing_directory_is_created_then_retried() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("deep").join("er");
        let mutex = MultiProcessMutex::new(nested.join("a.lock")).unwrap();

        assert_eq!(mutex.attempt().unwrap(), Attempt::Contended);
        assert!(nested.is_dir());
        assert_eq!(mutex.attempt().unwrap(), Attempt::Acquired);
    }

    #[test]
    fn foreign_platform_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.lock");
        let metadata = LockMetadata {
            platform: "plan9".to_string(),
            ..LockMetadata::for_current_process()
        };
        fs::write(&path, metadata.to_json().unwrap()).unwrap();
        let mutex = MultiProcessMutex::new(&path).unwrap();

        let err = mutex.attempt().unwrap_err();
        assert!(matches!(err, LockError::IncompatiblePlatform { ref lock_platform, .. } if lock_platform == "plan9"));
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn foreign_uid_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.lock");
        let local_uid = local_identity().uid.unwrap();
        let metadata = LockMetadata {
            uid: Some(local_uid.wrapping_add(1)),
            ..LockMetadata::for_current_process()
        };
        fs::write(&path, metadata.to_json().unwrap()).unwrap();
        let mutex = MultiProcessMutex::new(&path).unwrap();

        let err = mutex.attempt().unwrap_err();
        assert!(matches!(err, LockError::IncompatibleUid { lock_uid, .. } if lock_uid == local_uid.wrapping_add(1)));
        assert!(path.exists());
    }

    #[test]
    fn lock_without_uid_is_compatible() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.lock");
        let metadata = LockMetadata {
            uid: None,
            ..LockMetadata::for_current_process()
        };
        fs::write(&path, metadata.to_json().unwrap()).unwrap();
        let mutex = MultiProcessMutex::new(&path).unwrap();

        assert_eq!(mutex.attempt().unwrap(), Attempt::Contended);
    }

    #[test]
    fn unparsable_temp_files_survive_cleanup() {
        let dir = TempDir::new().unwrap();
        let keep = dir.path().join("a.lock.tmp-notapid-x-1-ff");
        let other = dir.path().join("b.lock.tmp-1-x-1-ff");
        fs::write(&keep, "").unwrap();
        fs::write(&other, "").unwrap();
        let mutex = MultiProcessMutex::new(dir.path().join("a.lock")).unwrap();

        mutex.clean_orphan_temp_files();
        assert!(keep.exists());
        assert!(other.exists());
    }

    #[test]
    fn unsupported_errors_are_classified() {
        assert!(is_hard_link_unsupported(&io::Error::from(
            ErrorKind::Unsupported
        )));
        assert!(!is_hard_link_unsupported(&io::Error::from(
            ErrorKind::PermissionDenied
        )));
        #[cfg(unix)]
        assert!(is_hard_link_unsupported(&io::Error::from_raw_os_error(
            libc::EOPNOTSUPP
        )));
    }

    #[test]
    fn permission_denied_link_is_retried() {
        let dir = TempDir::new().unwrap();
        let mutex = MultiProcessMutex::new(dir.path().join("a.lock")).unwrap();

        let outcome = mutex
            .classify_link_error(io::Error::from(ErrorKind::PermissionDenied))
            .unwrap();
        assert!(matches!(outcome, Publish::Retry));
        assert!(matches!(
            mutex.classify_link_error(io::Error::from(ErrorKind::AlreadyExists)),
            Ok(Publish::AlreadyExists)
        ));
        assert!(matches!(
            mutex.classify_link_error(io::Error::from(ErrorKind::Unsupported)),
            Err(LockError::System { .. })
        ));
    }

    #[test]
    fn blocked_stale_removal_requires_manual_removal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.lock");
        let mutex = MultiProcessMutex::new(&path).unwrap();

        for kind in [ErrorKind::PermissionDenied, ErrorKind::ResourceBusy] {
            let err = mutex
                .classify_removal_error(io::Error::from(kind), Some(1000))
                .unwrap_err();
            assert!(
                matches!(err, LockError::StaleRemovalFailed { uid: Some(1000), .. }),
                "{kind:?} gave {err:?}"
            );
            assert!(err.requires_manual_removal());
            assert!(err.to_string().contains(&path.display().to_string()));
        }
    }

    #[test]
    fn stale_removal_race_and_other_errors_are_classified() {
        let dir = TempDir::new().unwrap();
        let mutex = MultiProcessMutex::new(dir.path().join("a.lock")).unwrap();

        assert_eq!(
            mutex
                .classify_removal_error(io::Error::from(ErrorKind::NotFound), None)
                .unwrap(),
            Attempt::StaleReclaimed
        );
        assert!(matches!(
            mutex.classify_removal_error(io::Error::from(ErrorKind::InvalidInput), None),
            Err(LockError::System { .. })
        ));
    }
}
