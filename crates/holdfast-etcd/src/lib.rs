//! etcd lock backend for Holdfast
//!
//! Mutual exclusion rides on etcd leases:
//! - acquire: grant a lease for the handle's expiration, then a single
//!   transaction "key has never been created → put(key, value, lease)".
//!   A lost transaction is contention; the orphan lease is revoked.
//! - renew: one keep-alive round on the granted lease; a TTL of zero in
//!   the response means the lease (and the lock) already lapsed.
//! - release: delete the key and revoke the lease.
//!
//! The granted lease id is parked in the handle's backend-private slot
//! between calls; the coordination core never looks inside it.

use async_trait::async_trait;
use etcd_client::{Client, Compare, CompareOp, PutOptions, Txn, TxnOp};
use serde::{Deserialize, Serialize};

use holdfast_core::{ETCD_BACKEND, LockBackend, LockError, LockLease};

/// Connection settings, consumed once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtcdConfig {
    /// Cluster endpoints, e.g. `["localhost:2379"]`.
    pub endpoints: Vec<String>,
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["localhost:2379".to_string()],
        }
    }
}

/// Lease state parked on the handle between acquire, renew and release.
struct EtcdSession {
    lease_id: i64,
}

/// Lock backend arbitrated by an etcd cluster.
pub struct EtcdBackend {
    client: Client,
}

impl EtcdBackend {
    pub async fn connect(config: EtcdConfig) -> Result<Self, LockError> {
        let client = Client::connect(&config.endpoints, None)
            .await
            .map_err(LockError::backend)?;
        tracing::info!(endpoints = ?config.endpoints, "etcd lock backend connected");
        Ok(Self { client })
    }
}

#[async_trait]
impl LockBackend for EtcdBackend {
    fn backend_type(&self) -> &'static str {
        ETCD_BACKEND
    }

    async fn acquire(&self, lease: &mut LockLease<'_>) -> Result<bool, LockError> {
        let mut client = self.client.clone();

        let ttl_secs = lease.expiration.as_secs().max(1) as i64;
        let grant = client
            .lease_grant(ttl_secs, None)
            .await
            .map_err(LockError::backend)?;
        let lease_id = grant.id();

        let txn = Txn::new()
            .when([Compare::create_revision(lease.key, CompareOp::Equal, 0)])
            .and_then([TxnOp::put(
                lease.key,
                lease.value,
                Some(PutOptions::new().with_lease(lease_id)),
            )]);
        let resp = client.txn(txn).await.map_err(LockError::backend)?;

        if resp.succeeded() {
            lease.stash_session(EtcdSession { lease_id });
            Ok(true)
        } else {
            // Someone else holds the key; the fresh lease has no owner.
            if let Err(err) = client.lease_revoke(lease_id).await {
                tracing::debug!(lease_id, error = %err, "failed to revoke unused lease");
            }
            Ok(false)
        }
    }

    async fn release(&self, lease: &mut LockLease<'_>) -> Result<bool, LockError> {
        let Some(session) = lease.take_session::<EtcdSession>() else {
            return Ok(false);
        };

        let mut client = self.client.clone();
        client
            .delete(lease.key, None)
            .await
            .map_err(LockError::backend)?;
        // Revoking the lease also ends its keep-alive obligations.
        client
            .lease_revoke(session.lease_id)
            .await
            .map_err(LockError::backend)?;
        Ok(true)
    }

    async fn renew(&self, lease: &mut LockLease<'_>) -> Result<(), LockError> {
        let lease_id = lease
            .session_ref::<EtcdSession>()
            .map(|s| s.lease_id)
            .ok_or(LockError::NotHeld)?;

        let mut client = self.client.clone();
        let (mut keeper, mut stream) = client
            .lease_keep_alive(lease_id)
            .await
            .map_err(LockError::backend)?;
        keeper.keep_alive().await.map_err(LockError::backend)?;

        match stream.message().await.map_err(LockError::backend)? {
            Some(resp) if resp.ttl() > 0 => Ok(()),
            // The cluster no longer knows the lease: the lock lapsed.
            _ => Err(LockError::NotHeld),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = EtcdConfig::default();
        assert_eq!(config.endpoints, vec!["localhost:2379".to_string()]);
    }

    #[test]
    fn test_config_deserializes_endpoint_list() {
        let config: EtcdConfig =
            serde_json::from_str(r#"{"endpoints":["etcd-1:2379","etcd-2:2379"]}"#).unwrap();
        assert_eq!(config.endpoints.len(), 2);

        let config: EtcdConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.endpoints, vec!["localhost:2379".to_string()]);
    }
}
