//! In-memory queue backend for tests and single-process deployments.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{QueueError, WorkQueue};

/// Process-local FIFO queues keyed by name.
///
/// `pop` parks on a [`Notify`] instead of busy-polling, so blocked workers
/// wake as soon as a push lands.
pub struct InMemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    notify: Notify,
}

impl InMemoryQueue {
    /// Create a new queue set with no entries.
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    fn try_pop(&self, queue: &str) -> Result<Option<String>, QueueError> {
        let mut queues = self.queues.lock().map_err(|_| QueueError::LockPoisoned)?;
        Ok(queues.get_mut(queue).and_then(|q| q.pop_front()))
    }

    /// Number of entries currently waiting in `queue`.
    pub fn len(&self, queue: &str) -> Result<usize, QueueError> {
        let queues = self.queues.lock().map_err(|_| QueueError::LockPoisoned)?;
        Ok(queues.get(queue).map(|q| q.len()).unwrap_or(0))
    }

    /// Whether `queue` has no waiting entries.
    pub fn is_empty(&self, queue: &str) -> Result<bool, QueueError> {
        Ok(self.len(queue)? == 0)
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkQueue for InMemoryQueue {
    async fn push(&self, queue: &str, entry: &str) -> Result<(), QueueError> {
        {
            let mut queues = self.queues.lock().map_err(|_| QueueError::LockPoisoned)?;
            queues
                .entry(queue.to_string())
                .or_default()
                .push_back(entry.to_string());
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(entry) = self.try_pop(queue)? {
                return Ok(Some(entry));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let notified = self.notify.notified();
            // Re-check after registering the waiter so a push that landed in
            // between is not missed.
            if let Some(entry) = self.try_pop(queue)? {
                return Ok(Some(entry));
            }
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(None);
            }
        }
    }
}
