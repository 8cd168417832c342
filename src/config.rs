//! Configuration for the poller and the worker pool.

use std::time::Duration;

/// Queue the poller pushes claimed job ids onto.
pub const WORK_QUEUE: &str = "scheduler:work";

/// Lock key electing the active poller for a tick.
pub const POLLER_LOCK_KEY: &str = "scheduler:poller:lock";

/// Settings for the claim-and-enqueue poll loop.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// How often a tick fires.
    pub poll_interval: Duration,
    /// Lock key contended by all pollers.
    pub lock_key: String,
    /// Lease duration; bounds how long a crashed holder blocks others.
    pub lock_ttl: Duration,
    /// Queue claimed job ids are pushed onto.
    pub queue_name: String,
    /// Recorded as `claimed_by` on claimed jobs.
    pub identity: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            lock_key: POLLER_LOCK_KEY.to_string(),
            lock_ttl: Duration::from_secs(30),
            queue_name: WORK_QUEUE.to_string(),
            identity: default_identity(),
        }
    }
}

impl PollerConfig {
    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the lock TTL.
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Set the queue name.
    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    /// Set the identity recorded on claimed jobs.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }
}

/// Settings for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent worker loops.
    pub worker_count: usize,
    /// Queue the workers pop from.
    pub queue_name: String,
    /// How long a single pop blocks before re-checking for shutdown.
    pub pop_timeout: Duration,
    /// How long shutdown waits for in-flight jobs before giving up.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_name: WORK_QUEUE.to_string(),
            pop_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Set the number of worker loops.
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the queue name.
    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    /// Set the pop timeout.
    pub fn with_pop_timeout(mut self, timeout: Duration) -> Self {
        self.pop_timeout = timeout;
        self
    }

    /// Set the shutdown grace period.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Host-qualified identity, unique per process.
pub fn default_identity() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "scheduler".to_string());
    format!("{}-{}", host, uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poller_defaults() {
        let config = PollerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.lock_key, POLLER_LOCK_KEY);
        assert_eq!(config.queue_name, WORK_QUEUE);
        assert!(!config.identity.is_empty());
    }

    #[test]
    fn test_poller_builders() {
        let config = PollerConfig::default()
            .with_poll_interval(Duration::from_millis(100))
            .with_lock_ttl(Duration::from_secs(5))
            .with_queue_name("custom:queue")
            .with_identity("node-a");
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.lock_ttl, Duration::from_secs(5));
        assert_eq!(config.queue_name, "custom:queue");
        assert_eq!(config.identity, "node-a");
    }

    #[test]
    fn test_worker_builders() {
        let config = WorkerConfig::default()
            .with_worker_count(2)
            .with_pop_timeout(Duration::from_millis(50))
            .with_shutdown_timeout(Duration::from_secs(1));
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.pop_timeout, Duration::from_millis(50));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_identities_are_unique() {
        assert_ne!(default_identity(), default_identity());
    }
}
