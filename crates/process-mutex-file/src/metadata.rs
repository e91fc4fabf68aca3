//! Lock file metadata and validation.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::identity::{local_identity, now_millis, session_id};

/// Largest integer a JSON reader in any language can represent exactly.
const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Metadata stored in a lock file.
///
/// Written once, before the lock is published, and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockMetadata {
    /// Process id of the lock owner.
    pub pid: u32,

    /// Host the lock was created on.
    pub hostname: String,

    /// OS family the lock was created on.
    pub platform: String,

    /// Creation time in epoch milliseconds. Diagnostic only; staleness is
    /// decided by owner liveness, never by age.
    pub created_at: u64,

    /// Owning user id, where the OS has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,

    /// Random per-process session identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl LockMetadata {
    /// Creates metadata describing the current process.
    pub fn for_current_process() -> Self {
        let identity = local_identity();
        Self {
            pid: std::process::id(),
            hostname: identity.hostname.clone(),
            platform: identity.platform.to_string(),
            created_at: now_millis(),
            uid: identity.uid,
            session_id: Some(session_id().to_string()),
        }
    }

    /// Serializes the metadata to its on-disk JSON form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses and validates metadata, returning `None` for anything malformed.
    pub fn from_json(content: &str) -> Option<Self> {
        let metadata: Self = serde_json::from_str(content).ok()?;
        metadata.is_valid().then_some(metadata)
    }

    /// Checks the bounds that the type system alone does not enforce.
    pub fn is_valid(&self) -> bool {
        let pid_ok = self.pid > 0 && i32::try_from(self.pid).is_ok();
        let created_ok = self.created_at > 0 && self.created_at <= MAX_SAFE_INTEGER;
        let session_ok = self.session_id.as_deref().is_none_or(|s| !s.is_empty());

        pid_ok
            && created_ok
            && !self.hostname.is_empty()
            && !self.platform.is_empty()
            && session_ok
    }
}

/// Reads the metadata of the lock file at `path`.
///
/// Returns `None` when the file is missing, unreadable, or does not hold a
/// valid record. Callers treat that exactly like a stale lock, since a crashed
/// writer can leave a half-written file behind.
pub fn read_lock_metadata(path: &Path) -> Option<LockMetadata> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!(lock.path = %path.display(), error = %e, "lock metadata unreadable");
            return None;
        }
    };

    let metadata = LockMetadata::from_json(&content);
    if metadata.is_none() {
        debug!(lock.path = %path.display(), "lock metadata malformed");
    }
    metadata
}
