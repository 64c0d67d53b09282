//! Scripted in-memory backend used by the protocol tests to count and
//! steer backend calls.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{LockBackend, LockLease};
use crate::error::LockError;

/// Outcome of one scripted acquisition attempt.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Script {
    Grant,
    Deny,
    Fault,
}

pub(crate) struct ScriptedBackend {
    script: Mutex<VecDeque<Script>>,
    fallback: Script,
    pub(crate) acquire_calls: AtomicUsize,
    pub(crate) release_calls: AtomicUsize,
    pub(crate) renew_calls: AtomicUsize,
    pub(crate) fail_release: AtomicBool,
    pub(crate) fail_renew: AtomicBool,
    /// Artificial latency inside acquire, for mutual-exclusion tests.
    pub(crate) acquire_delay_ms: AtomicU64,
}

impl ScriptedBackend {
    fn with_fallback(script: Vec<Script>, fallback: Script) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            acquire_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
            renew_calls: AtomicUsize::new(0),
            fail_release: AtomicBool::new(false),
            fail_renew: AtomicBool::new(false),
            acquire_delay_ms: AtomicU64::new(0),
        }
    }

    /// Every acquisition attempt succeeds.
    pub(crate) fn granting() -> Self {
        Self::with_fallback(Vec::new(), Script::Grant)
    }

    /// Every acquisition attempt reports contention.
    pub(crate) fn denying() -> Self {
        Self::with_fallback(Vec::new(), Script::Deny)
    }

    /// Play back `script` one attempt at a time, denying once exhausted.
    pub(crate) fn scripted(script: Vec<Script>) -> Self {
        Self::with_fallback(script, Script::Deny)
    }

    fn next_step(&self) -> Script {
        self.script
            .lock()
            .expect("script mutex poisoned")
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

#[async_trait]
impl LockBackend for ScriptedBackend {
    fn backend_type(&self) -> &'static str {
        "scripted"
    }

    async fn acquire(&self, _lease: &mut LockLease<'_>) -> Result<bool, LockError> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.acquire_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        match self.next_step() {
            Script::Grant => Ok(true),
            Script::Deny => Ok(false),
            Script::Fault => Err(LockError::Backend(anyhow::anyhow!(
                "injected backend fault"
            ))),
        }
    }

    async fn release(&self, _lease: &mut LockLease<'_>) -> Result<bool, LockError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(LockError::Backend(anyhow::anyhow!(
                "injected release fault"
            )));
        }
        Ok(true)
    }

    async fn renew(&self, _lease: &mut LockLease<'_>) -> Result<(), LockError> {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_renew.load(Ordering::SeqCst) {
            return Err(LockError::NotHeld);
        }
        Ok(())
    }
}
