//! Lock handle and the acquisition / release protocols.
//!
//! A [`LockHandle`] is the unit of coordination state: one logical lock
//! attempt on one named resource. The handle carries the identity and
//! retry policy, the acquisition protocol turns a backend's single-shot
//! acquire into a bounded, cancellable retry loop, and the release
//! protocol tears the lock down idempotently and stops the watchdog
//! before returning.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::LockLease;
use crate::error::LockError;
use crate::registry::BackendRegistry;
use crate::watchdog;

/// Bounded-retry policy for lock acquisition: at most `attempts` backend
/// calls, with a fixed `delay` between consecutive calls (never before the
/// first).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(100),
        }
    }
}

/// Handle state guarded by the exclusive-access mutex. Every read-modify-
/// write on it (acquire, renew tick, release) holds the mutex for the whole
/// sequence, backend call included.
pub(crate) struct HandleState {
    /// Backend-private slot; owned by the adapter currently holding the
    /// lock for this handle, never inspected by the core.
    pub(crate) session: Option<Box<dyn std::any::Any + Send>>,
    /// Stop signal for the current watchdog. Replaced with a fresh token on
    /// every successful acquisition; cancelling is idempotent.
    pub(crate) cancel: CancellationToken,
    /// At most one watchdog task per handle.
    pub(crate) watchdog: Option<JoinHandle<()>>,
}

pub(crate) struct HandleInner {
    pub(crate) key: String,
    pub(crate) value: String,
    pub(crate) expiration: Duration,
    pub(crate) retry: RetryPolicy,
    /// Observable from any thread without taking the state mutex; mutated
    /// only while the mutex is held.
    pub(crate) held: AtomicBool,
    pub(crate) state: Mutex<HandleState>,
}

impl HandleInner {
    /// Per-call lease view over this handle's identity and session slot.
    /// Callers must hold the state mutex; the slot borrow enforces it.
    pub(crate) fn lease<'a>(&'a self, state: &'a mut HandleState) -> LockLease<'a> {
        LockLease {
            key: &self.key,
            value: &self.value,
            expiration: self.expiration,
            session: &mut state.session,
        }
    }
}

/// Client-side record of one lock attempt / holding on a named resource.
///
/// Cheap to clone; clones share the same acquisition state. Acquisition and
/// release are mutually exclusive per handle, while [`LockHandle::is_held`]
/// may be read from any thread at any time.
#[derive(Clone)]
pub struct LockHandle {
    pub(crate) inner: Arc<HandleInner>,
}

impl LockHandle {
    /// Create a handle for `key` with the default retry policy
    /// (3 attempts, 100 ms apart).
    ///
    /// `value` is the holder identity token, used by backends that must
    /// verify the releaser is the original holder; `expiration` is how long
    /// the lock stays valid without renewal.
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        expiration: Duration,
    ) -> Self {
        Self::with_policy(key, value, expiration, RetryPolicy::default())
    }

    /// Create a handle with an explicit retry policy. A policy with zero
    /// attempts makes every acquisition report contention without a single
    /// backend call; validate configuration upstream if that is not what
    /// you want.
    pub fn with_policy(
        key: impl Into<String>,
        value: impl Into<String>,
        expiration: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                key: key.into(),
                value: value.into(),
                expiration,
                retry,
                held: AtomicBool::new(false),
                state: Mutex::new(HandleState {
                    session: None,
                    cancel: CancellationToken::new(),
                    watchdog: None,
                }),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn value(&self) -> &str {
        &self.inner.value
    }

    pub fn expiration(&self) -> Duration {
        self.inner.expiration
    }

    /// Whether the last acquisition succeeded and no release (or lost
    /// renewal) has completed since.
    pub fn is_held(&self) -> bool {
        self.inner.held.load(Ordering::SeqCst)
    }

    /// Acquire the lock through the backend registered under
    /// `backend_type`, retrying on contention per the handle's policy.
    ///
    /// Returns `Ok(true)` once acquired, `Ok(false)` when every attempt was
    /// contended — contention is not an error. Both blocking points are
    /// preemptible: if `cancel` fires during the inter-attempt wait or
    /// while an adapter call is in flight, the call returns
    /// [`LockError::Cancelled`] without waiting the attempt out. Re-invoking on a
    /// handle that is already held returns `Ok(true)` without a backend
    /// call. On success a watchdog task is started that renews the lock at
    /// half its expiration until release.
    pub async fn acquire(
        &self,
        registry: &BackendRegistry,
        backend_type: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, LockError> {
        let backend = registry.lookup(backend_type)?;

        // Exclusive access for the whole attempt sequence: acquire is
        // atomic with respect to other acquire/release calls on the handle.
        let mut state = self.inner.state.lock().await;
        if self.inner.held.load(Ordering::SeqCst) {
            return Ok(true);
        }

        let mut acquired = false;
        let mut last_err: Option<LockError> = None;

        for attempt in 0..self.inner.retry.attempts {
            if attempt != 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(LockError::Cancelled),
                    _ = tokio::time::sleep(self.inner.retry.delay) => {}
                }
            }

            // The adapter call is itself a blocking point: abandoning it on
            // cancellation must not wait out a network timeout. Dropping the
            // in-flight future is the abandonment.
            let mut lease = self.inner.lease(&mut state);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LockError::Cancelled),
                outcome = backend.acquire(&mut lease) => outcome,
            };
            match outcome {
                Ok(true) => {
                    acquired = true;
                    last_err = None;
                    break;
                }
                Ok(false) => {
                    last_err = None;
                    tracing::debug!(
                        key = %self.inner.key,
                        backend = backend_type,
                        attempt,
                        "lock contended"
                    );
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    // Absorbed as a failed attempt; only surfaced if the
                    // budget runs out with the error still outstanding.
                    tracing::debug!(
                        key = %self.inner.key,
                        backend = backend_type,
                        attempt,
                        error = %err,
                        "lock acquisition attempt failed"
                    );
                    last_err = Some(err);
                }
            }
        }

        if let Some(err) = last_err {
            return Err(err);
        }

        if acquired {
            self.inner.held.store(true, Ordering::SeqCst);
            let token = CancellationToken::new();
            state.cancel = token.clone();
            state.watchdog = Some(watchdog::spawn(self.clone(), backend, token));
            tracing::debug!(key = %self.inner.key, backend = backend_type, "lock acquired");
        }

        Ok(acquired)
    }

    /// Release the lock through the backend registered under
    /// `backend_type`.
    ///
    /// Idempotent: releasing a handle that is not held (never acquired,
    /// already released, or lost by a failed renewal) is a no-op success.
    /// On backend success the watchdog is stopped and joined before this
    /// returns, so no renewal for this handle runs after release. On
    /// backend failure the error is propagated and the held flag is left
    /// as-is; the caller cannot assume the lock was released.
    pub async fn release(
        &self,
        registry: &BackendRegistry,
        backend_type: &str,
    ) -> Result<(), LockError> {
        let backend = registry.lookup(backend_type)?;

        let mut state = self.inner.state.lock().await;
        if !self.inner.held.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut lease = self.inner.lease(&mut state);
        let released = backend.release(&mut lease).await?;

        self.inner.held.store(false, Ordering::SeqCst);
        state.cancel.cancel();
        state.session = None;
        let watchdog = state.watchdog.take();
        drop(state);

        if released {
            tracing::debug!(key = %self.inner.key, backend = backend_type, "lock released");
        } else {
            tracing::debug!(
                key = %self.inner.key,
                backend = backend_type,
                "lock was already released by another holder"
            );
        }

        // Join the watchdog so no renewal tick is still in flight once
        // release returns. The task exits promptly: its stop token is
        // cancelled and the held flag is down.
        if let Some(task) = watchdog {
            if let Err(err) = task.await {
                tracing::warn!(key = %self.inner.key, error = %err, "watchdog task panicked");
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("key", &self.inner.key)
            .field("expiration", &self.inner.expiration)
            .field("retry", &self.inner.retry)
            .field("held", &self.is_held())
            .finish()
    }
}
