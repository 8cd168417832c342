//! In-memory lock backend for tests and single-process deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::{DistributedLock, LockError};

/// A held lease: who holds it and until when.
struct Lease {
    token: String,
    expires_at: Instant,
}

/// Process-local lock with the same TTL and token semantics as the
/// distributed backends.
pub struct InMemoryLock {
    leases: Mutex<HashMap<String, Lease>>,
}

impl InMemoryLock {
    /// Create a new lock with no held leases.
    pub fn new() -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryLock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<String>, LockError> {
        let mut leases = self.leases.lock().map_err(|_| LockError::LockPoisoned)?;
        let now = Instant::now();

        if let Some(lease) = leases.get(key) {
            if lease.expires_at > now {
                return Ok(None);
            }
        }

        let token = Uuid::new_v4().to_string();
        leases.insert(
            key.to_string(),
            Lease {
                token: token.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool, LockError> {
        let mut leases = self.leases.lock().map_err(|_| LockError::LockPoisoned)?;
        match leases.get(key) {
            Some(lease) if lease.token == token && lease.expires_at > Instant::now() => {
                leases.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
