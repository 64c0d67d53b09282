//! Backend capability contract consumed by the coordination core.
//!
//! Every storage system that can arbitrate mutual exclusion plugs in here:
//! one adapter implements [`LockBackend`], registers itself under a stable
//! type name, and the core stays ignorant of how the backend actually
//! enforces exclusivity (conditional SET, ephemeral node, lease, advisory
//! lock).

use std::any::Any;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LockError;

/// Reserved type name for the cache-based adapter.
pub const REDIS_BACKEND: &str = "redis";
/// Reserved type name for the consensus-store adapter.
pub const ETCD_BACKEND: &str = "etcd";
/// Reserved type name for the coordination-service adapter.
pub const ZOOKEEPER_BACKEND: &str = "zookeeper";
/// Reserved type name for the relational-database adapter.
pub const MYSQL_BACKEND: &str = "mysql";
/// Reserved type name for the in-process adapter.
pub const MEMORY_BACKEND: &str = "memory";

/// Per-call view of one lock handle, constructed by the core while it holds
/// the handle's state lock.
///
/// Adapters never see the handle itself, so they cannot touch the held flag
/// or the watchdog. The `session` slot is the one piece of handle state an
/// adapter owns: an opaque place to park connection or lease state across
/// acquire → renew → release calls on the same handle. The core never
/// inspects it.
pub struct LockLease<'a> {
    /// Identifier of the protected resource, unique within the backend's
    /// namespace.
    pub key: &'a str,
    /// Opaque holder identity token chosen by the caller.
    pub value: &'a str,
    /// Requested validity without renewal (TTL, session timeout, lease).
    pub expiration: Duration,
    /// Backend-private state slot, owned by whichever adapter currently
    /// holds the lock for this handle.
    pub session: &'a mut Option<Box<dyn Any + Send>>,
}

impl LockLease<'_> {
    /// Park adapter-private state on the handle, replacing anything there.
    pub fn stash_session<T: Any + Send>(&mut self, session: T) {
        *self.session = Some(Box::new(session));
    }

    /// Borrow the parked state, if it is of type `T`.
    pub fn session_ref<T: Any + Send>(&self) -> Option<&T> {
        self.session.as_ref().and_then(|s| s.downcast_ref::<T>())
    }

    /// Take the parked state out of the slot, if it is of type `T`.
    pub fn take_session<T: Any + Send>(&mut self) -> Option<T> {
        if self.session.as_ref().is_some_and(|s| s.is::<T>()) {
            self.session
                .take()
                .and_then(|s| s.downcast::<T>().ok())
                .map(|s| *s)
        } else {
            None
        }
    }
}

/// One lock-arbitrating store, seen from the core.
///
/// All three operations are single attempts from the core's perspective:
/// retry policy lives in the acquisition protocol, not in adapters.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Stable identifier used for registry lookup.
    fn backend_type(&self) -> &'static str;

    /// Attempt exactly one acquisition. `Ok(true)` means acquired,
    /// `Ok(false)` means contended (not an error), `Err` means a
    /// transport or backend fault.
    async fn acquire(&self, lease: &mut LockLease<'_>) -> Result<bool, LockError>;

    /// Attempt to release. `Ok(true)` means released by this call,
    /// `Ok(false)` means not held / already released by someone else.
    async fn release(&self, lease: &mut LockLease<'_>) -> Result<bool, LockError>;

    /// Extend the validity of an already-held lock. Fails with
    /// [`LockError::NotHeld`] if the backend has no record of this
    /// handle's lock.
    async fn renew(&self, lease: &mut LockLease<'_>) -> Result<(), LockError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSession {
        lease_id: i64,
    }

    fn lease_over<'a>(slot: &'a mut Option<Box<dyn Any + Send>>) -> LockLease<'a> {
        LockLease {
            key: "orders",
            value: "worker-1",
            expiration: Duration::from_secs(5),
            session: slot,
        }
    }

    #[test]
    fn test_session_round_trip() {
        let mut slot = None;
        let mut lease = lease_over(&mut slot);

        assert!(lease.session_ref::<FakeSession>().is_none());
        lease.stash_session(FakeSession { lease_id: 42 });
        assert_eq!(lease.session_ref::<FakeSession>().unwrap().lease_id, 42);

        let taken = lease.take_session::<FakeSession>().unwrap();
        assert_eq!(taken.lease_id, 42);
        assert!(slot.is_none());
    }

    #[test]
    fn test_take_session_wrong_type_leaves_slot() {
        let mut slot = None;
        let mut lease = lease_over(&mut slot);
        lease.stash_session(FakeSession { lease_id: 7 });

        assert!(lease.take_session::<String>().is_none());
        assert_eq!(lease.session_ref::<FakeSession>().unwrap().lease_id, 7);
    }
}
