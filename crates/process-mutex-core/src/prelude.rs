//! Convenience prelude for process mutex types.

pub use crate::async_mutex::AsyncMutex;
pub use crate::error::{LockError, LockResult};
pub use crate::traits::{LockHandle, LockProvider, ProcessLock, ProcessLockExt};
