//! Core traits for process mutexes.

use std::future::Future;
use std::path::Path;

use tracing::warn;

use crate::error::{LockError, LockResult};

// ============================================================================
// Lock Handle Trait
// ============================================================================

/// Handle to a held process mutex.
///
/// Dropping this handle releases the lock. Call `release()` explicitly to
/// observe release failures.
///
/// # Example
///
/// ```rust,ignore
/// let handle = lock.acquire().await?;
/// // Critical section - no other process holds the lock
/// do_work().await;
/// handle.release().await?;
/// // A second release is a no-op
/// handle.release().await?;
/// ```
pub trait LockHandle: Send + Sync {
    /// Returns the path of the lock file this handle guards.
    fn path(&self) -> &Path;

    /// Returns `true` once the handle has been released.
    fn is_released(&self) -> bool;

    /// Releases the lock.
    ///
    /// Idempotent: releasing an already released handle, or a lock whose file
    /// has disappeared, succeeds without doing anything.
    fn release(&self) -> impl Future<Output = LockResult<()>> + Send;
}

// ============================================================================
// Process Lock Trait
// ============================================================================

/// A mutual exclusion lock shared by independent processes on one host.
///
/// # Example
///
/// ```rust,ignore
/// use process_mutex_core::ProcessLock;
///
/// async fn rebuild_cache(lock: &impl ProcessLock) -> Result<(), Error> {
///     let handle = lock.acquire().await?;
///     regenerate().await?;
///     handle.release().await?;
///     Ok(())
/// }
/// ```
pub trait ProcessLock: Send + Sync {
    /// The handle type returned when the lock is acquired.
    type Handle: LockHandle + Send;

    /// Returns the lock file path.
    fn path(&self) -> &Path;

    /// Acquires the lock, polling until the configured timeout elapses.
    ///
    /// # Returns
    ///
    /// * `Ok(handle)` - Lock acquired
    /// * `Err(LockError::Timeout)` - A live owner kept the lock past the timeout
    /// * `Err(LockError::Incompatible*)` - The owner cannot be checked from this process
    /// * `Err(LockError::StaleRemovalFailed)` - A stale lock could not be deleted
    /// * `Err(LockError::System)` - Unexpected operating system failure
    fn acquire(&self) -> impl Future<Output = LockResult<Self::Handle>> + Send;

    /// Attempts to acquire the lock without waiting on a live owner.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(handle))` - Lock acquired
    /// * `Ok(None)` - Lock is held by a live process
    /// * `Err(...)` - Same terminal errors as [`acquire`](Self::acquire)
    fn try_acquire(&self) -> impl Future<Output = LockResult<Option<Self::Handle>>> + Send;
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Factory for creating process locks by name.
pub trait LockProvider: Send + Sync {
    /// The lock type created by this provider.
    type Lock: ProcessLock;

    /// Creates a lock with the given name.
    fn create_lock(&self, name: &str) -> LockResult<Self::Lock>;
}

// ============================================================================
// Convenience Extensions
// ============================================================================

/// Scoped acquisition for any [`ProcessLock`].
pub trait ProcessLockExt: ProcessLock {
    /// Acquires the lock, runs `f`, and releases the lock afterwards.
    ///
    /// The lock is released on every exit path. If `f` fails its error is
    /// returned after the release; if only the release fails, that error is
    /// returned instead. `f` never runs unless the lock is held.
    fn with_lock<F, Fut, T, E>(&self, f: F) -> impl Future<Output = Result<T, E>> + Send
    where
        Self: Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<LockError> + Send,
    {
        async move {
            let handle = self.acquire().await?;
            let outcome = f().await;
            settle(outcome, handle.release().await)
        }
    }

    /// Like [`try_acquire`](ProcessLock::try_acquire) followed by `f`.
    ///
    /// Returns `Ok(None)` without running `f` when a live process holds the lock.
    fn try_with_lock<F, Fut, T, E>(&self, f: F) -> impl Future<Output = Result<Option<T>, E>> + Send
    where
        Self: Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<LockError> + Send,
    {
        async move {
            let Some(handle) = self.try_acquire().await? else {
                return Ok(None);
            };
            let outcome = f().await;
            settle(outcome, handle.release().await).map(Some)
        }
    }
}

/// Combines the protected operation's result with the release result.
fn settle<T, E: From<LockError>>(outcome: Result<T, E>, released: LockResult<()>) -> Result<T, E> {
    match (outcome, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release_err)) => Err(release_err.into()),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            warn!(
                lock.path = %release_err.path().display(),
                error = %release_err,
                "failed to release lock after protected operation failed"
            );
            Err(err)
        }
    }
}

// Blanket implementation for all process locks
impl<T: ProcessLock> ProcessLockExt for T {}
