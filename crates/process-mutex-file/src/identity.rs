//! Identity of the current process as recorded in lock files.

use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

/// Host, OS family and user of the current process.
///
/// A lock can only be judged stale, and removed, by a process that shares all
/// three with the lock's creator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub hostname: String,
    pub platform: &'static str,
    pub uid: Option<u32>,
}

static LOCAL_IDENTITY: LazyLock<LocalIdentity> = LazyLock::new(|| LocalIdentity {
    hostname: hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string()),
    platform: std::env::consts::OS,
    uid: current_uid(),
});

// Generated once per process lifetime.
static SESSION_ID: LazyLock<String> = LazyLock::new(|| {
    let mut rng = rand::thread_rng();
    format!("{:016x}", rng.r#gen::<u64>())
});

/// Returns the identity of the current process.
pub fn local_identity() -> &'static LocalIdentity {
    &LOCAL_IDENTITY
}

/// Returns the random session identifier of the current process.
pub fn session_id() -> &'static str {
    &SESSION_ID
}

/// Returns the real user id of the current process, where the OS has one.
pub fn current_uid() -> Option<u32> {
    #[cfg(unix)]
    {
        // SAFETY: getuid has no preconditions and cannot fail.
        Some(unsafe { libc::getuid() })
    }

    #[cfg(not(unix))]
    {
        None
    }
}

/// Gets current time in milliseconds since Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
