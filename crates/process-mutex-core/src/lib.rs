//! Core traits and types for filesystem process mutexes.

pub mod async_mutex;
pub mod backoff;
pub mod error;
pub mod prelude;
pub mod traits;

pub use backoff::{Backoff, DEFAULT_INITIAL_POLL_INTERVAL, DEFAULT_TIMEOUT, MAX_POLL_INTERVAL};
pub use error::{LockError, LockResult};
pub use prelude::*;
