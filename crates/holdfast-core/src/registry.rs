//! Backend registry: type name → adapter instance.
//!
//! An explicitly constructed registry is passed to every lock operation
//! instead of living in process-wide mutable state, so tests can inject
//! their own registry with mock adapters.

use std::sync::Arc;

use dashmap::DashMap;

use crate::backend::LockBackend;
use crate::error::LockError;

/// Concurrency-safe mapping from a backend type name to one registered
/// adapter instance. Populated at startup, read on every lock operation.
#[derive(Default)]
pub struct BackendRegistry {
    backends: DashMap<String, Arc<dyn LockBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under the type name it reports. Re-registration
    /// is allowed; the last registration for a given name wins silently.
    pub fn register(&self, backend: Arc<dyn LockBackend>) {
        let backend_type = backend.backend_type();
        tracing::info!(backend = backend_type, "lock backend registered");
        self.backends.insert(backend_type.to_string(), backend);
    }

    /// Look up the adapter registered under `backend_type`.
    pub fn lookup(&self, backend_type: &str) -> Result<Arc<dyn LockBackend>, LockError> {
        self.backends
            .get(backend_type)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LockError::BackendNotFound(backend_type.to_string()))
    }

    /// Type names currently registered, in no particular order.
    pub fn backend_types(&self) -> Vec<String> {
        self.backends.iter().map(|e| e.key().clone()).collect()
    }
}
