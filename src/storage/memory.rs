//! In-memory job store.
//!
//! Thread-safe backend for testing and single-process deployments. The
//! claim and the version-guarded save both run under one write lock, which
//! is what makes them atomic here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::{JobStore, StorageError};
use crate::core::job::{Job, JobStatus};
use crate::core::types::JobId;

/// A stored record plus its insertion sequence (claim tiebreaker).
struct Slot {
    job: Job,
    seq: u64,
}

/// In-memory storage backend.
///
/// Data is not persisted across restarts.
pub struct InMemoryStore {
    jobs: RwLock<HashMap<JobId, Slot>>,
    next_seq: AtomicU64,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn create(&self, mut job: Job) -> Result<Job, StorageError> {
        let mut jobs = self.jobs.write().map_err(|_| StorageError::LockPoisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(StorageError::DuplicateKey(format!("job: {}", job.id)));
        }
        job.version = 0;
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        jobs.insert(job.id, Slot { job: job.clone(), seq });
        Ok(job)
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>, StorageError> {
        let jobs = self.jobs.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(jobs.get(id).map(|slot| slot.job.clone()))
    }

    async fn list(&self) -> Result<Vec<Job>, StorageError> {
        let jobs = self.jobs.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut slots: Vec<_> = jobs.values().collect();
        slots.sort_by_key(|slot| slot.seq);
        Ok(slots.iter().map(|slot| slot.job.clone()).collect())
    }

    async fn claim_next_due(
        &self,
        now: DateTime<Utc>,
        claimed_by: &str,
    ) -> Result<Option<Job>, StorageError> {
        let mut jobs = self.jobs.write().map_err(|_| StorageError::LockPoisoned)?;

        let candidate = jobs
            .values()
            .filter(|slot| slot.job.is_due(now))
            .min_by_key(|slot| (slot.job.scheduled_at, slot.seq))
            .map(|slot| slot.job.id);

        let Some(id) = candidate else {
            return Ok(None);
        };

        // Still under the write lock, so the select-and-update is atomic.
        let slot = jobs
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("job: {}", id)))?;
        slot.job
            .transition(JobStatus::Running, now)
            .map_err(|e| StorageError::Other(e.to_string()))?;
        slot.job.claimed_by = Some(claimed_by.to_string());
        slot.job.version += 1;
        Ok(Some(slot.job.clone()))
    }

    async fn save(&self, mut job: Job, expected_version: i64) -> Result<Job, StorageError> {
        let mut jobs = self.jobs.write().map_err(|_| StorageError::LockPoisoned)?;
        let slot = jobs
            .get_mut(&job.id)
            .ok_or_else(|| StorageError::NotFound(format!("job: {}", job.id)))?;

        if slot.job.version != expected_version {
            return Err(StorageError::Conflict(format!(
                "job {} is at version {}, expected {}",
                job.id, slot.job.version, expected_version
            )));
        }

        job.version = expected_version + 1;
        slot.job = job.clone();
        Ok(job)
    }
}
