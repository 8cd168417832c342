//! The job record and its status state machine.
//!
//! A [`Job`] is the persisted unit of scheduled work. Status changes go
//! through [`Job::transition`], which applies the timestamp side effects of
//! each legal edge and rejects everything else. Persistence of a transition
//! is a separate concern: callers hand the mutated record to
//! `JobStore::save` together with the version they read, and branch on the
//! conflict result as ordinary control flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::JobId;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting to become due and be claimed.
    Pending,
    /// Claimed by a poller or worker; execution in flight or imminent.
    Running,
    /// Finished successfully. Terminal.
    Completed,
    /// Execution failed or no executor existed. Terminal.
    Failed,
}

impl JobStatus {
    /// Whether this status has no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Stable string form used by storage backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Error returned for a transition the state machine does not allow.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// The source status is terminal; nothing leaves it.
    #[error("job is {from} which is terminal; cannot transition to {to}")]
    Terminal { from: JobStatus, to: JobStatus },

    /// The edge is not part of the state machine.
    #[error("illegal transition {from} -> {to}")]
    Illegal { from: JobStatus, to: JobStatus },
}

/// Outcome of a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status changed; the record must be saved.
    Applied,
    /// The target equals the current status; no save, no side effect.
    Unchanged,
}

/// The persisted job record.
///
/// Identity and equality are defined by `id` alone. `version` is the
/// optimistic-concurrency counter: the store increments it on every
/// persisted mutation, and a save against a stale version is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier, assigned at creation.
    pub id: JobId,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Registry key resolving to an executor.
    pub job_type: String,
    /// Opaque payload, meaningful only to the resolved executor.
    pub payload: serde_json::Value,
    /// Due timestamp; eligible for claim once `scheduled_at <= now`.
    pub scheduled_at: DateTime<Utc>,
    /// Set on entry to Running, cleared on revert to Pending.
    pub started_at: Option<DateTime<Utc>>,
    /// Set on entry to Completed. A failed job records no finish time.
    pub finished_at: Option<DateTime<Utc>>,
    /// Diagnostic identity of the claiming process. Write-only.
    pub claimed_by: Option<String>,
    /// Monotonic counter detecting lost-update races.
    pub version: i64,
}

impl Job {
    /// Create a new pending job due at `scheduled_at`.
    pub fn new(
        job_type: impl Into<String>,
        payload: serde_json::Value,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            job_type: job_type.into(),
            payload,
            scheduled_at,
            started_at: None,
            finished_at: None,
            claimed_by: None,
            version: 0,
        }
    }

    /// Whether the job is eligible for claiming at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.scheduled_at <= now
    }

    /// Apply a status transition in memory.
    ///
    /// A request whose target equals the current status returns
    /// [`Transition::Unchanged`] and touches nothing. Legal edges apply
    /// their timestamp side effects:
    ///
    /// - `Pending -> Running` sets `started_at`
    /// - `Running -> Pending` clears `started_at` and `claimed_by` (revert)
    /// - `Running -> Completed` sets `finished_at`
    /// - `Running -> Failed` sets no timestamp
    pub fn transition(
        &mut self,
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        let from = self.status;
        if from == to {
            return Ok(Transition::Unchanged);
        }
        if from.is_terminal() {
            return Err(TransitionError::Terminal { from, to });
        }
        match (from, to) {
            (JobStatus::Pending, JobStatus::Running) => {
                self.started_at = Some(now);
            }
            (JobStatus::Running, JobStatus::Pending) => {
                self.started_at = None;
                self.claimed_by = None;
            }
            (JobStatus::Running, JobStatus::Completed) => {
                self.finished_at = Some(now);
            }
            (JobStatus::Running, JobStatus::Failed) => {}
            _ => return Err(TransitionError::Illegal { from, to }),
        }
        self.status = to;
        Ok(Transition::Applied)
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}
