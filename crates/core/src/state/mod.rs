//! State persistence: JSON snapshot stores and the advisory lock guarding
//! the calibration store.
//!
//! The scheduler store is only ever touched by the supervisor and needs no
//! lock; the calibration store is shared between workers and between trigger
//! instances, so every load-mutate-save cycle on it runs under a
//! [`FileLock`].

mod lock;
mod store;

pub use lock::{FileLock, LockError, LockGuard};
pub use store::{StateError, StateStore};
