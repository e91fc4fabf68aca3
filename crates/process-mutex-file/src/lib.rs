//! File system backend for process mutexes.
//!
//! A lock is a file whose existence means "held". It is created atomically by
//! hard-linking a fully written temp file to the lock path, and removed by its
//! owner on release or by any compatible process that proves the owner dead.

pub mod handle;
pub mod identity;
pub mod liveness;
pub mod lock;
pub mod metadata;
pub mod name;
pub mod provider;

pub use handle::MultiProcessMutexHandle;
pub use identity::{LocalIdentity, local_identity, session_id};
pub use liveness::ProcessLiveness;
pub use lock::{MultiProcessMutex, MultiProcessMutexBuilder};
pub use metadata::{LockMetadata, read_lock_metadata};
pub use provider::{MultiProcessMutexProvider, MultiProcessMutexProviderBuilder};
