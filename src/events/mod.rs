//! Lifecycle events and event handling.
//!
//! Events trace a job through the pipeline: submitted, claimed and
//! enqueued, reverted (enqueue failed), completed, failed. Handlers are
//! observers only; the pipeline never branches on them.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::types::JobId;

/// Lifecycle events emitted as jobs move through the pipeline.
#[derive(Debug, Clone)]
pub enum Event {
    /// A job was accepted into storage.
    JobSubmitted {
        job_id: JobId,
        job_type: String,
        timestamp: Instant,
    },

    /// The poller claimed a due job and handed it to the queue.
    JobClaimed {
        job_id: JobId,
        claimed_by: String,
        timestamp: Instant,
    },

    /// A claimed job could not be enqueued and was put back to pending.
    JobReverted {
        job_id: JobId,
        reason: String,
        timestamp: Instant,
    },

    /// A worker finished a job successfully.
    JobCompleted {
        job_id: JobId,
        duration: Duration,
        timestamp: Instant,
    },

    /// A worker finished a job with a failure. Terminal.
    JobFailed {
        job_id: JobId,
        error: String,
        duration: Duration,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::JobSubmitted { timestamp, .. } => *timestamp,
            Event::JobClaimed { timestamp, .. } => *timestamp,
            Event::JobReverted { timestamp, .. } => *timestamp,
            Event::JobCompleted { timestamp, .. } => *timestamp,
            Event::JobFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job id the event concerns.
    pub fn job_id(&self) -> JobId {
        match self {
            Event::JobSubmitted { job_id, .. } => *job_id,
            Event::JobClaimed { job_id, .. } => *job_id,
            Event::JobReverted { job_id, .. } => *job_id,
            Event::JobCompleted { job_id, .. } => *job_id,
            Event::JobFailed { job_id, .. } => *job_id,
        }
    }

    /// Create a JobSubmitted event.
    pub fn job_submitted(job_id: JobId, job_type: impl Into<String>) -> Self {
        Event::JobSubmitted {
            job_id,
            job_type: job_type.into(),
            timestamp: Instant::now(),
        }
    }

    /// Create a JobClaimed event.
    pub fn job_claimed(job_id: JobId, claimed_by: impl Into<String>) -> Self {
        Event::JobClaimed {
            job_id,
            claimed_by: claimed_by.into(),
            timestamp: Instant::now(),
        }
    }

    /// Create a JobReverted event.
    pub fn job_reverted(job_id: JobId, reason: impl Into<String>) -> Self {
        Event::JobReverted {
            job_id,
            reason: reason.into(),
            timestamp: Instant::now(),
        }
    }

    /// Create a JobCompleted event.
    pub fn job_completed(job_id: JobId, duration: Duration) -> Self {
        Event::JobCompleted {
            job_id,
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobFailed event.
    pub fn job_failed(job_id: JobId, error: impl Into<String>, duration: Duration) -> Self {
        Event::JobFailed {
            job_id,
            error: error.into(),
            duration,
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
