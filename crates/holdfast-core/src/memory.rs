//! In-process lock backend.
//!
//! Arbitration lives in a concurrent map inside the current process, so
//! this backend coordinates tasks of one process only. It exists for
//! integration tests and single-process deployments that want the same
//! handle lifecycle they would get against a real store.

use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::backend::{LockBackend, LockLease, MEMORY_BACKEND};
use crate::error::LockError;

struct MemoryEntry {
    owner: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Lock backend arbitrated by an in-process concurrent map with per-entry
/// expiry. Entries lapse passively: an expired entry is treated as absent
/// by whichever call observes it next.
#[derive(Default)]
pub struct MemoryBackend {
    locks: DashMap<String, MemoryEntry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired entries, primarily for tests and diagnostics.
    pub fn active_locks(&self) -> usize {
        self.locks.iter().filter(|e| !e.expired()).count()
    }
}

#[async_trait]
impl LockBackend for MemoryBackend {
    fn backend_type(&self) -> &'static str {
        MEMORY_BACKEND
    }

    async fn acquire(&self, lease: &mut LockLease<'_>) -> Result<bool, LockError> {
        let mut entry = self
            .locks
            .entry(lease.key.to_string())
            .or_insert_with(|| MemoryEntry {
                owner: lease.value.to_string(),
                expires_at: Instant::now() + lease.expiration,
            });

        if entry.owner == lease.value || entry.expired() {
            entry.owner = lease.value.to_string();
            entry.expires_at = Instant::now() + lease.expiration;
            return Ok(true);
        }
        Ok(false)
    }

    async fn release(&self, lease: &mut LockLease<'_>) -> Result<bool, LockError> {
        let removed = self
            .locks
            .remove_if(lease.key, |_, entry| entry.owner == lease.value);
        Ok(removed.is_some())
    }

    async fn renew(&self, lease: &mut LockLease<'_>) -> Result<(), LockError> {
        match self.locks.get_mut(lease.key) {
            Some(mut entry) if entry.owner == lease.value && !entry.expired() => {
                entry.expires_at = Instant::now() + lease.expiration;
                Ok(())
            }
            _ => Err(LockError::NotHeld),
        }
    }
}
