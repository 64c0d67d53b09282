//! Redis lock backend for Holdfast
//!
//! Mutual exclusion rides on Redis's conditional SET:
//! - acquire: `SET key value NX PX <expiration>` — one non-blocking attempt
//! - release: compare-value-then-delete as a Lua script, so only the
//!   original holder's identity token can delete the key
//! - renew: `PEXPIRE`; a missing key means the lock already lapsed
//!
//! The expiration is enforced server-side by the key TTL; a crashed holder
//! leaves nothing behind once the TTL runs out.

use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};

use holdfast_core::{LockBackend, LockError, LockLease, REDIS_BACKEND};

/// Delete the key only while it still carries the holder's identity token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Connection settings, consumed once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis connection URL, e.g. `redis://:password@host:6379/0`.
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// Lock backend arbitrated by a single Redis instance.
pub struct RedisBackend {
    conn: ConnectionManager,
    release_script: Script,
}

impl RedisBackend {
    /// Connect and hand back a backend ready for registration. The
    /// connection manager reconnects on its own after transport drops.
    pub async fn connect(config: RedisConfig) -> Result<Self, LockError> {
        let client = redis::Client::open(config.url.as_str()).map_err(LockError::backend)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(LockError::backend)?;
        tracing::info!(url = %config.url, "redis lock backend connected");
        Ok(Self {
            conn,
            release_script: Script::new(RELEASE_SCRIPT),
        })
    }
}

#[async_trait]
impl LockBackend for RedisBackend {
    fn backend_type(&self) -> &'static str {
        REDIS_BACKEND
    }

    async fn acquire(&self, lease: &mut LockLease<'_>) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        // NX makes this a single compare-and-set; a live key means contention.
        let reply: Option<String> = redis::cmd("SET")
            .arg(lease.key)
            .arg(lease.value)
            .arg("NX")
            .arg("PX")
            .arg(lease.expiration.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(LockError::backend)?;
        Ok(reply.is_some())
    }

    async fn release(&self, lease: &mut LockLease<'_>) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .release_script
            .key(lease.key)
            .arg(lease.value)
            .invoke_async(&mut conn)
            .await
            .map_err(LockError::backend)?;
        Ok(deleted == 1)
    }

    async fn renew(&self, lease: &mut LockLease<'_>) -> Result<(), LockError> {
        let mut conn = self.conn.clone();
        let refreshed: bool = redis::cmd("PEXPIRE")
            .arg(lease.key)
            .arg(lease.expiration.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(LockError::backend)?;
        if refreshed {
            Ok(())
        } else {
            Err(LockError::NotHeld)
        }
    }
}
