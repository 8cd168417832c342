//! Persistence abstraction for job records.
//!
//! [`JobStore`] is the single source of truth for job state. Backends must
//! make two operations race-safe under concurrent callers: `claim_next_due`
//! (exactly one caller may claim a given row) and `save` (rejected when the
//! caller's version is stale). The conflict case is an ordinary result
//! variant, not an exception: callers match on [`StorageError::Conflict`]
//! and usually treat it as "another writer already handled this".

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::job::Job;
use crate::core::types::JobId;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested record was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The save was rejected because another writer advanced the version.
    /// A benign race, handled as control flow by every caller.
    #[error("version conflict: {0}")]
    Conflict(String),

    /// A record with this id already exists.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Storage lock was poisoned.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// Generic storage error.
    #[error("storage error: {0}")]
    Other(String),
}

/// Storage trait for the job lifecycle record.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job with `version = 0`.
    async fn create(&self, job: Job) -> Result<Job, StorageError>;

    /// Fetch a job by id.
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>, StorageError>;

    /// List all jobs in submission order.
    async fn list(&self) -> Result<Vec<Job>, StorageError>;

    /// Atomically claim the next due job.
    ///
    /// Selects the pending job with the smallest `scheduled_at <= now`
    /// (ties broken by insertion order) and transitions it to Running in
    /// the same atomic step, recording `claimed_by` and `started_at` and
    /// incrementing the version. Exactly one concurrent caller can claim a
    /// given row; everyone else sees `None` or a different row.
    async fn claim_next_due(
        &self,
        now: DateTime<Utc>,
        claimed_by: &str,
    ) -> Result<Option<Job>, StorageError>;

    /// Persist a mutated job, guarded by the version the caller read.
    ///
    /// Succeeds only if the stored version still equals
    /// `expected_version`; on success the stored version is incremented
    /// and the updated record is returned. A mismatch yields
    /// [`StorageError::Conflict`] and leaves the record untouched.
    async fn save(&self, job: Job, expected_version: i64) -> Result<Job, StorageError>;
}
