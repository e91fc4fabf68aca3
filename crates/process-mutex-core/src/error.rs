//! Error types for process mutex operations.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while acquiring or releasing a process mutex.
///
/// Every variant carries the lock path so the message alone is enough to
/// find and, where necessary, remove the offending lock file by hand.
#[derive(Error, Debug)]
pub enum LockError {
    /// The lock path was not absolute or has no file name.
    #[error("lock path must be an absolute file path, got '{}'", .0.display())]
    InvalidPath(PathBuf),

    /// The lock stayed held by a live, compatible process past the deadline.
    #[error("timed out after {timeout:?} waiting for lock '{}'", .path.display())]
    Timeout { path: PathBuf, timeout: Duration },

    /// The lock was created on another machine.
    #[error(
        "lock '{}' is owned by host '{lock_hostname}' but this host is '{local_hostname}'; \
         its owner cannot be checked from here, delete the file manually if it is stale",
        .path.display()
    )]
    IncompatibleHostname {
        path: PathBuf,
        lock_hostname: String,
        local_hostname: String,
    },

    /// The lock was created by a process running on another OS family.
    #[error(
        "lock '{}' was created on platform '{lock_platform}' but this is '{local_platform}'; \
         delete the file manually if it is stale",
        .path.display()
    )]
    IncompatiblePlatform {
        path: PathBuf,
        lock_platform: String,
        local_platform: String,
    },

    /// The lock is owned by another user and cannot be removed by this one.
    #[error(
        "lock '{}' is owned by uid {lock_uid} but this process runs as uid {local_uid}; \
         delete the file manually if it is stale",
        .path.display()
    )]
    IncompatibleUid {
        path: PathBuf,
        lock_uid: u32,
        local_uid: u32,
    },

    /// A provably stale lock could not be deleted.
    #[error(
        "failed to remove stale lock '{}'{}: {source}; delete the file manually",
        .path.display(),
        .uid.map(|uid| format!(" (owned by uid {uid})")).unwrap_or_default()
    )]
    StaleRemovalFailed {
        path: PathBuf,
        uid: Option<u32>,
        #[source]
        source: std::io::Error,
    },

    /// Any other operating system failure.
    #[error("system error on lock '{}': {source}", .path.display())]
    System {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl LockError {
    /// Wraps an unexpected failure for the lock at `path`.
    pub fn system(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::System {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Returns the lock path this error refers to.
    pub fn path(&self) -> &Path {
        match self {
            Self::InvalidPath(path) => path,
            Self::Timeout { path, .. }
            | Self::IncompatibleHostname { path, .. }
            | Self::IncompatiblePlatform { path, .. }
            | Self::IncompatibleUid { path, .. }
            | Self::StaleRemovalFailed { path, .. }
            | Self::System { path, .. } => path,
        }
    }

    /// Returns `true` if a human has to delete the lock file before it can be acquired.
    pub fn requires_manual_removal(&self) -> bool {
        matches!(
            self,
            Self::IncompatibleHostname { .. }
                | Self::IncompatiblePlatform { .. }
                | Self::IncompatibleUid { .. }
                | Self::StaleRemovalFailed { .. }
        )
    }
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_embed_lock_path_and_conflicting_owner() {
        let err = LockError::IncompatibleHostname {
            path: PathBuf::from("/var/lock/build.lock"),
            lock_hostname: "builder-7".to_string(),
            local_hostname: "laptop".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/var/lock/build.lock"));
        assert!(msg.contains("builder-7"));
        assert!(msg.contains("laptop"));
        assert!(err.requires_manual_removal());
    }

    #[test]
    fn stale_removal_message_includes_uid_when_known() {
        let err = LockError::StaleRemovalFailed {
            path: PathBuf::from("/tmp/a.lock"),
            uid: Some(1001),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("uid 1001"));

        let err = LockError::StaleRemovalFailed {
            path: PathBuf::from("/tmp/a.lock"),
            uid: None,
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(!err.to_string().contains("uid"));
    }

    #[test]
    fn system_error_keeps_source() {
        let io = std::io::Error::other("disk full");
        let err = LockError::system("/tmp/a.lock", io);
        assert_eq!(err.path(), Path::new("/tmp/a.lock"));
        assert!(!err.requires_manual_removal());
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("disk full"));
    }

    #[test]
    fn timeout_is_not_a_manual_removal() {
        let err = LockError::Timeout {
            path: PathBuf::from("/tmp/a.lock"),
            timeout: Duration::from_millis(250),
        };
        assert!(!err.requires_manual_removal());
        assert!(err.to_string().contains("250ms"));
    }
}
