//! ZooKeeper lock backend for Holdfast
//!
//! Mutual exclusion rides on ephemeral znodes:
//! - acquire: create `<prefix>/<key>` as an ephemeral node carrying the
//!   holder's identity token; `NodeExists` is contention
//! - renew: stat the node — ephemeral validity rides on the client
//!   session, so a still-present node is a still-valid lock
//! - release: delete the node
//!
//! The handle's expiration maps onto the ZooKeeper session timeout rather
//! than a per-node TTL: if this process dies, the session lapses and the
//! ensemble removes the ephemeral node on its own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zookeeper_client as zk;

use holdfast_core::{LockBackend, LockError, LockLease, ZOOKEEPER_BACKEND};

/// Connection settings, consumed once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZookeeperConfig {
    /// Ensemble connection string, e.g. `"zk-1:2181,zk-2:2181"`.
    pub cluster: String,
    /// Chroot-style prefix under which lock nodes are created.
    pub prefix: String,
}

impl Default for ZookeeperConfig {
    fn default() -> Self {
        Self {
            cluster: "127.0.0.1:2181".to_string(),
            prefix: "/locks".to_string(),
        }
    }
}

/// Lock backend arbitrated by a ZooKeeper ensemble.
pub struct ZookeeperBackend {
    client: zk::Client,
    prefix: String,
}

impl ZookeeperBackend {
    /// Connect and make sure the lock prefix chain exists.
    pub async fn connect(config: ZookeeperConfig) -> Result<Self, LockError> {
        let client = zk::Client::connect(&config.cluster)
            .await
            .map_err(LockError::backend)?;
        let prefix = normalize_prefix(&config.prefix);

        let backend = Self { client, prefix };
        backend.ensure_path(&backend.prefix).await?;
        tracing::info!(cluster = %config.cluster, prefix = %backend.prefix, "zookeeper lock backend connected");
        Ok(backend)
    }

    fn lock_path(&self, key: &str) -> String {
        format!("{}/{}", self.prefix, key.trim_matches('/'))
    }

    /// Create every node along `path` as a persistent znode, tolerating
    /// nodes that already exist.
    async fn ensure_path(&self, path: &str) -> Result<(), LockError> {
        let mut current = String::new();
        for node in path.split('/').filter(|n| !n.is_empty()) {
            current.push('/');
            current.push_str(node);
            match self
                .client
                .create(
                    &current,
                    &[],
                    &zk::CreateMode::Persistent.with_acls(zk::Acls::anyone_all()),
                )
                .await
            {
                Ok(_) | Err(zk::Error::NodeExists) => {}
                Err(err) => return Err(LockError::backend(err)),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LockBackend for ZookeeperBackend {
    fn backend_type(&self) -> &'static str {
        ZOOKEEPER_BACKEND
    }

    async fn acquire(&self, lease: &mut LockLease<'_>) -> Result<bool, LockError> {
        let path = self.lock_path(lease.key);
        if let Some((parent, _)) = path.rsplit_once('/') {
            if !parent.is_empty() {
                self.ensure_path(parent).await?;
            }
        }

        match self
            .client
            .create(
                &path,
                lease.value.as_bytes(),
                &zk::CreateMode::Ephemeral.with_acls(zk::Acls::anyone_all()),
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(zk::Error::NodeExists) => Ok(false),
            Err(err) => Err(LockError::backend(err)),
        }
    }

    async fn release(&self, lease: &mut LockLease<'_>) -> Result<bool, LockError> {
        let path = self.lock_path(lease.key);
        match self.client.delete(&path, None).await {
            Ok(()) => Ok(true),
            // Already gone: session lapsed or another holder took over.
            Err(zk::Error::NoNode) => Ok(false),
            Err(err) => Err(LockError::backend(err)),
        }
    }

    async fn renew(&self, lease: &mut LockLease<'_>) -> Result<(), LockError> {
        let path = self.lock_path(lease.key);
        match self
            .client
            .check_stat(&path)
            .await
            .map_err(LockError::backend)?
        {
            Some(_) => Ok(()),
            None => Err(LockError::NotHeld),
        }
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/locks".to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ZookeeperConfig::default();
        assert_eq!(config.cluster, "127.0.0.1:2181");
        assert_eq!(config.prefix, "/locks");
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/locks/"), "/locks");
        assert_eq!(normalize_prefix("locks"), "/locks");
        assert_eq!(normalize_prefix("a/b"), "/a/b");
        assert_eq!(normalize_prefix(""), "/locks");
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: ZookeeperConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.prefix, "/locks");

        let config: ZookeeperConfig =
            serde_json::from_str(r#"{"cluster":"zk-1:2181,zk-2:2181","prefix":"/coord/locks"}"#)
                .unwrap();
        assert_eq!(config.cluster, "zk-1:2181,zk-2:2181");
        assert_eq!(config.prefix, "/coord/locks");
    }
}
