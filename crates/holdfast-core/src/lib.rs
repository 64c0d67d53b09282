//! Holdfast Core - backend-agnostic distributed lock coordination
//!
//! This crate provides the client-side coordination layer for distributed
//! mutual exclusion:
//! - Lock handle lifecycle (acquire, hold, release) on a named resource
//! - Bounded-retry acquisition honoring caller cancellation
//! - Background watchdog that renews a held lock at half its expiration
//! - Pluggable backend registry; adapters implement [`LockBackend`]
//!
//! No durable state is owned here — all arbitration lives in the chosen
//! backend (see the `holdfast-redis`, `holdfast-etcd`,
//! `holdfast-zookeeper` and `holdfast-mysql` crates, or the in-process
//! [`MemoryBackend`]).
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use holdfast_core::{BackendRegistry, LockHandle, MemoryBackend, MEMORY_BACKEND};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), holdfast_core::LockError> {
//! let registry = BackendRegistry::new();
//! registry.register(Arc::new(MemoryBackend::new()));
//!
//! let lock = LockHandle::new("jobs/reindex", "worker-1", Duration::from_secs(30));
//! if lock.acquire(&registry, MEMORY_BACKEND, &CancellationToken::new()).await? {
//!     // critical section; the watchdog keeps the lock alive
//!     lock.release(&registry, MEMORY_BACKEND).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod handle;
pub mod memory;
pub mod registry;

mod watchdog;

#[cfg(test)]
mod test_support;

// Re-export the caller-facing surface
pub use backend::{
    ETCD_BACKEND, LockBackend, LockLease, MEMORY_BACKEND, MYSQL_BACKEND, REDIS_BACKEND,
    ZOOKEEPER_BACKEND,
};
pub use error::LockError;
pub use handle::{LockHandle, RetryPolicy};
pub use memory::MemoryBackend;
pub use registry::BackendRegistry;
