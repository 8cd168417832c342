//! Redis queue backend.
//!
//! LPUSH/BRPOP over a Redis list: pushes land at the left, workers block
//! on the right, so entries come out in push order across any number of
//! scheduler processes.

use async_trait::async_trait;
use std::time::Duration;

use super::{QueueError, WorkQueue};

/// Redis-backed work queue.
pub struct RedisQueue {
    client: redis::Client,
}

impl RedisQueue {
    /// Connect to Redis at `url` (e.g. `redis://localhost:6379`).
    pub fn new(url: impl AsRef<str>) -> Result<Self, QueueError> {
        let client =
            redis::Client::open(url.as_ref()).map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WorkQueue for RedisQueue {
    async fn push(&self, queue: &str, entry: &str) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        let _: i64 = redis::cmd("LPUSH")
            .arg(queue)
            .arg(entry)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        // BRPOP returns (key, value) or nil on timeout.
        let reply: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(queue)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        Ok(reply.map(|(_, entry)| entry))
    }
}
