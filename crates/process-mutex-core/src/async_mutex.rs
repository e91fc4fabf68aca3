//! In-process cooperative mutex.
//!
//! [`AsyncMutex`] serializes concurrent tasks of one process before they reach
//! the inter-process lock. It is backed by [`tokio::sync::Mutex`], which
//! queues waiters fairly, so tasks enter in the order they started waiting.

use std::future::Future;

use tokio::sync::Mutex;

/// A FIFO mutex for tasks within a single process.
///
/// There is no timeout and no visibility to other processes.
#[derive(Debug, Default)]
pub struct AsyncMutex {
    inner: Mutex<()>,
}

impl AsyncMutex {
    /// Creates an unlocked mutex.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the mutex.
    ///
    /// The mutex is released when `f` completes, fails, panics, or when the
    /// returned future is dropped.
    pub async fn exclusive_run<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.inner.lock().await;
        f().await
    }

    /// Returns `true` while some task holds the mutex.
    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}
