//! FIFO handoff between the poller and the worker pool.
//!
//! Queue entries are job-id strings, nothing more; workers reload the
//! authoritative record from storage before touching it. Delivery is
//! at-least-once: a popped entry whose work is interrupted is simply
//! re-delivered by a later poll cycle, and workers are written to tolerate
//! duplicates.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::InMemoryQueue;
#[cfg(feature = "redis")]
pub use redis::RedisQueue;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Queue state mutex was poisoned.
    #[error("queue state poisoned")]
    LockPoisoned,

    /// Backend failure (connection, protocol).
    #[error("queue backend error: {0}")]
    Backend(String),
}

/// A named FIFO queue of job-id strings.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Append an entry to the tail of `queue`.
    async fn push(&self, queue: &str, entry: &str) -> Result<(), QueueError>;

    /// Pop the head of `queue`, waiting up to `timeout` for an entry.
    ///
    /// Returns `None` when the queue stayed empty for the whole timeout.
    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, QueueError>;
}
