//! Filesystem based mutual exclusion between processes.
//!
//! Cooperating processes on the same machine serialize access to a shared
//! resource through a lock file. A lock is taken by hard-linking a fully
//! written temp file to the lock path, so the lock file never exists without
//! its owner metadata. Locks left behind by crashed processes are detected
//! through a pid liveness probe and reclaimed.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use process_mutex::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mutex = MultiProcessMutex::builder("/tmp/locks/build.lock")
//!         .timeout(Duration::from_secs(5))
//!         .build()?;
//!
//!     // Lock, run, release; the lock is released even if the closure fails.
//!     mutex
//!         .with_lock(|| async {
//!             println!("Doing critical work...");
//!             Ok::<_, Box<dyn std::error::Error + Send + Sync>>(())
//!         })
//!         .await?;
//!
//!     // Or hold the handle yourself (release also happens on drop).
//!     let handle = mutex.acquire().await?;
//!     handle.release().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Named locks
//!
//! ```rust,no_run
//! use process_mutex::*;
//!
//! # fn main() -> LockResult<()> {
//! let provider = MultiProcessMutexProvider::new("/tmp/locks")?;
//! let lock = provider.create_lock("cache/compile")?;
//! # Ok(())
//! # }
//! ```
//!
//! # In-process serialization
//!
//! [`AsyncMutex`] runs async operations one at a time in FIFO order within a
//! single process. It is independent of the lock files.
//!
//! # Crate Organization
//!
//! This is a meta-crate that re-exports types from:
//! - `process-mutex-core`: errors, traits, backoff and [`AsyncMutex`]
//! - `process-mutex-file`: the lock file backend
//!
//! For fine-grained control, you can depend on individual crates instead.

// Re-export core types and traits
pub use process_mutex_core::*;

// Re-export file backend
pub use process_mutex_file::*;
