//! Distributed lock guarding the poller's critical section.
//!
//! The lock elects at most one active poller per tick across all scheduler
//! processes. Acquisition hands back a random token; release is
//! compare-and-delete against that token, so a holder whose lease expired
//! cannot delete a lock someone else has since acquired. The TTL bounds how
//! long a crashed holder can block other pollers.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::InMemoryLock;
#[cfg(feature = "redis")]
pub use redis::RedisLock;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during lock operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Lock state mutex was poisoned.
    #[error("lock state poisoned")]
    LockPoisoned,

    /// Backend failure (connection, protocol).
    #[error("lock backend error: {0}")]
    Backend(String),
}

/// A TTL-bounded, token-verified mutual exclusion primitive.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try to acquire `key` for `ttl`.
    ///
    /// Returns `Some(token)` when this caller now holds the lock and
    /// `None` when somebody else does. Never blocks waiting for the lock.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<String>, LockError>;

    /// Release `key`, but only if it is still held under `token`.
    ///
    /// Returns `true` when the lock was deleted, `false` when the token no
    /// longer matched (lease expired and someone else acquired, or the key
    /// was already gone).
    async fn release(&self, key: &str, token: &str) -> Result<bool, LockError>;
}
