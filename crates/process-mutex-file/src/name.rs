//! Lock and temp file naming.

use std::path::{Path, PathBuf};

use rand::Rng;
use sha2::{Digest, Sha256};

use process_mutex_core::error::{LockError, LockResult};

use crate::identity::{now_millis, session_id};

/// Separator between a lock file name and its temp-file suffix.
const TEMP_MARKER: &str = ".tmp-";

/// Longest sanitized prefix kept from a lock name.
const MAX_BASE_NAME_LENGTH: usize = 40;

/// Hex characters of the name hash appended to every lock file name.
const HASH_LENGTH_IN_CHARS: usize = 16;

const EXTENSION: &str = ".lock";

/// Converts a lock name to a file path inside `directory`.
///
/// # Rules
///
/// - Alphanumerics, `-` and `_` are kept, everything else becomes `_`
/// - The kept prefix is truncated to a portable length
/// - A hash of the full name is appended so names differing only in
///   replaced or truncated characters still map to different files
pub fn lock_file_path(directory: &Path, name: &str) -> LockResult<PathBuf> {
    if name.is_empty() {
        return Err(LockError::InvalidPath(directory.join(name)));
    }

    let base_name: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .take(MAX_BASE_NAME_LENGTH)
        .collect();

    Ok(directory.join(format!("{base_name}-{}{EXTENSION}", name_hash(name))))
}

fn name_hash(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    let mut hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    hex.truncate(HASH_LENGTH_IN_CHARS);
    hex
}

/// Builds a fresh temp file name for staging metadata of `lock_file_name`.
///
/// Format: `<lock_file_name>.tmp-<pid>-<session_id>-<epoch_ms>-<random>`
pub fn temp_file_name(lock_file_name: &str) -> String {
    let random: u32 = rand::thread_rng().r#gen();
    format!(
        "{lock_file_name}{TEMP_MARKER}{}-{}-{}-{random:08x}",
        std::process::id(),
        session_id(),
        now_millis(),
    )
}

/// Extracts the creator pid from a temp file name belonging to `lock_file_name`.
///
/// Returns `None` for unrelated entries and for names whose pid cannot be
/// parsed, so that nothing unverifiable is ever deleted.
pub fn temp_file_pid(entry_name: &str, lock_file_name: &str) -> Option<u32> {
    let rest = entry_name
        .strip_prefix(lock_file_name)?
        .strip_prefix(TEMP_MARKER)?;
    let (pid, _) = rest.split_once('-')?;
    if pid.is_empty() || !pid.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    pid.parse().ok().filter(|&pid| pid > 0)
}
