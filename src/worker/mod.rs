//! Worker pool: pops job ids off the queue and executes them.
//!
//! Queue entries are hints, storage is the truth. Every popped id is
//! re-read from the store before any work happens, so duplicate
//! deliveries, entries for vanished jobs, and jobs another worker already
//! finished are all absorbed here. Finalization is version-guarded; a
//! conflict means another worker won and this one walks away.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::core::job::{Job, JobStatus};
use crate::core::types::JobId;
use crate::events::{Event, EventBus};
use crate::executor::ExecutorRegistry;
use crate::queue::WorkQueue;
use crate::storage::{JobStore, StorageError};

/// Pool of identical worker loops sharing one queue.
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    registry: Arc<ExecutorRegistry>,
    event_bus: Arc<EventBus>,
    config: WorkerConfig,
}

/// Handle for stopping a running pool.
pub struct WorkerPoolHandle {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    grace: std::time::Duration,
}

impl WorkerPoolHandle {
    /// Signal all workers to stop and wait for in-flight jobs to finish.
    ///
    /// Workers that do not drain within the grace period are abandoned
    /// with a warning; their jobs stay running in storage.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        let deadline = Instant::now() + self.grace;
        for (index, handle) in self.handles.into_iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(worker = index, error = %e, "worker task panicked"),
                Err(_) => {
                    warn!(worker = index, "worker did not stop within grace period");
                }
            }
        }
    }
}

impl WorkerPool {
    /// Create a pool over the given backends.
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn WorkQueue>,
        registry: Arc<ExecutorRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            queue,
            registry,
            event_bus: Arc::new(EventBus::new()),
            config,
        }
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Spawn the worker loops and return a handle for stopping them.
    pub fn start(self) -> WorkerPoolHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let grace = self.config.shutdown_timeout;
        let worker_count = self.config.worker_count;
        let context = Arc::new(WorkerContext {
            store: self.store,
            queue: self.queue,
            registry: self.registry,
            event_bus: self.event_bus,
            config: self.config,
        });

        info!(workers = worker_count, "worker pool starting");
        let handles = (0..worker_count)
            .map(|index| {
                let context = Arc::clone(&context);
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    worker_loop(context, index, shutdown_rx).await;
                })
            })
            .collect();

        WorkerPoolHandle {
            shutdown_tx,
            handles,
            grace,
        }
    }
}

/// Shared state of all worker loops in a pool.
struct WorkerContext {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    registry: Arc<ExecutorRegistry>,
    event_bus: Arc<EventBus>,
    config: WorkerConfig,
}

async fn worker_loop(
    context: Arc<WorkerContext>,
    index: usize,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let identity = format!("worker-{}", index);
    debug!(worker = %identity, "worker loop started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }

            popped = context.queue.pop(&context.config.queue_name, context.config.pop_timeout) => {
                match popped {
                    Ok(Some(entry)) => {
                        process_entry(&context, &identity, &entry).await;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(worker = %identity, error = %e, "queue pop failed");
                        // Back off briefly so a dead backend does not spin the loop.
                        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                    }
                }
            }
        }
    }

    debug!(worker = %identity, "worker loop stopped");
}

/// Handle one popped queue entry end to end.
///
/// Every early return here is deliberate: malformed ids, vanished jobs,
/// finished jobs, and lost version races are absorbed without failing the
/// loop, because the entry may be a stale duplicate.
async fn process_entry(context: &WorkerContext, identity: &str, entry: &str) {
    let job_id: JobId = match entry.parse() {
        Ok(id) => id,
        Err(e) => {
            warn!(worker = %identity, entry = %entry, error = %e, "discarding malformed queue entry");
            return;
        }
    };

    let job = match context.store.find_by_id(&job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            warn!(worker = %identity, job_id = %job_id, "queue entry for unknown job, discarding");
            return;
        }
        Err(e) => {
            warn!(worker = %identity, job_id = %job_id, error = %e, "failed to load job, leaving entry consumed");
            return;
        }
    };

    if job.status.is_terminal() {
        debug!(worker = %identity, job_id = %job_id, status = %job.status, "duplicate delivery of finished job, skipping");
        return;
    }

    // A reverted-then-redelivered job arrives pending; reclaim it before
    // executing. Losing that race means another worker has it.
    let job = match reclaim_if_pending(context, identity, job).await {
        Some(job) => job,
        None => return,
    };

    let Some(executor) = context.registry.get(&job.job_type) else {
        warn!(worker = %identity, job_id = %job_id, job_type = %job.job_type, "no executor registered, failing job");
        let error = format!("no executor registered for type {:?}", job.job_type);
        finalize(
            context,
            identity,
            job,
            JobStatus::Failed,
            Some(error),
            std::time::Duration::ZERO,
        )
        .await;
        return;
    };
    let executor = Arc::clone(executor);

    let started = Instant::now();
    match executor.execute(&job).await {
        Ok(()) => {
            let duration = started.elapsed();
            info!(worker = %identity, job_id = %job_id, duration_ms = duration.as_millis() as u64, "job completed");
            finalize(context, identity, job, JobStatus::Completed, None, duration).await;
        }
        Err(e) => {
            let duration = started.elapsed();
            warn!(worker = %identity, job_id = %job_id, error = %e, "job execution failed");
            finalize(
                context,
                identity,
                job,
                JobStatus::Failed,
                Some(e.to_string()),
                duration,
            )
            .await;
        }
    }
}

/// Move a pending job back to running under this worker's name.
///
/// Returns `None` when the job should not be executed here (version race
/// lost, save failed, or the record is in a state the claim cannot leave).
async fn reclaim_if_pending(
    context: &WorkerContext,
    identity: &str,
    mut job: Job,
) -> Option<Job> {
    if job.status != JobStatus::Pending {
        return Some(job);
    }

    let expected_version = job.version;
    if let Err(e) = job.transition(JobStatus::Running, chrono::Utc::now()) {
        warn!(worker = %identity, job_id = %job.id, error = %e, "cannot reclaim job");
        return None;
    }
    job.claimed_by = Some(identity.to_string());

    match context.store.save(job, expected_version).await {
        Ok(saved) => Some(saved),
        Err(StorageError::Conflict(_)) => {
            debug!(worker = %identity, "lost reclaim race, another worker has the job");
            None
        }
        Err(e) => {
            warn!(worker = %identity, error = %e, "failed to reclaim job");
            None
        }
    }
}

/// Persist the terminal status and emit the matching event.
///
/// A version conflict here means someone else already finalized the job;
/// the local result is dropped, which is the at-least-once contract.
async fn finalize(
    context: &WorkerContext,
    identity: &str,
    mut job: Job,
    to: JobStatus,
    error: Option<String>,
    duration: std::time::Duration,
) {
    let job_id = job.id;
    let expected_version = job.version;
    if let Err(e) = job.transition(to, chrono::Utc::now()) {
        warn!(worker = %identity, job_id = %job_id, error = %e, "illegal finalization");
        return;
    }

    match context.store.save(job, expected_version).await {
        Ok(_) => {
            let event = match to {
                JobStatus::Completed => Event::job_completed(job_id, duration),
                _ => Event::job_failed(
                    job_id,
                    error.unwrap_or_else(|| "unknown error".to_string()),
                    duration,
                ),
            };
            context.event_bus.emit(event).await;
        }
        Err(StorageError::Conflict(_)) => {
            debug!(worker = %identity, job_id = %job_id, "job already finalized elsewhere, dropping local result");
        }
        Err(e) => {
            warn!(worker = %identity, job_id = %job_id, error = %e, "failed to persist job outcome");
        }
    }
}
