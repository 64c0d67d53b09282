//! Error types for the coordination core.
//!
//! Contention is deliberately not part of this taxonomy: a denied
//! acquisition attempt is reported as `Ok(false)`, so callers can tell
//! "the system said no" apart from "something broke".

use thiserror::Error;

/// Errors surfaced by the coordination core and its backends.
#[derive(Debug, Error)]
pub enum LockError {
    /// No backend was registered under the requested type name.
    #[error("no lock backend registered under '{0}'")]
    BackendNotFound(String),

    /// Release or renew was attempted on a lock the backend has no record of.
    #[error("lock not held")]
    NotHeld,

    /// The backend could not re-establish a lock it was asked to renew.
    #[error("failed to acquire lock")]
    NotAcquired,

    /// The caller's cancellation signal fired while waiting to retry.
    #[error("lock acquisition cancelled")]
    Cancelled,

    /// Transport or backend fault reported by an adapter.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl LockError {
    /// Wrap an adapter's client error as a backend fault.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        LockError::Backend(anyhow::Error::new(err))
    }

    /// Whether this error should stop an acquisition retry loop early
    /// instead of being absorbed as a failed attempt.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, LockError::BackendNotFound(_) | LockError::Cancelled)
    }
}
