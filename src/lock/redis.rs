//! Redis lock backend.
//!
//! Acquire is `SET key token NX PX ttl`; release is a Lua script that
//! deletes the key only when it still holds the caller's token. Both are
//! single round trips, so the lock stays correct under concurrent pollers
//! on different hosts.

use async_trait::async_trait;
use redis::Script;
use std::time::Duration;
use uuid::Uuid;

use super::{DistributedLock, LockError};

const RELEASE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

/// Redis-backed distributed lock.
pub struct RedisLock {
    client: redis::Client,
    release_script: Script,
}

impl RedisLock {
    /// Connect to Redis at `url` (e.g. `redis://localhost:6379`).
    pub fn new(url: impl AsRef<str>) -> Result<Self, LockError> {
        let client =
            redis::Client::open(url.as_ref()).map_err(|e| LockError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            release_script: Script::new(RELEASE_SCRIPT),
        })
    }
}

#[async_trait]
impl DistributedLock for RedisLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<String>, LockError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;

        let token = Uuid::new_v4().to_string();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;

        // SET NX returns nil when the key already exists.
        Ok(reply.map(|_| token))
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool, LockError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;

        let deleted: i64 = self
            .release_script
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;

        Ok(deleted == 1)
    }
}
