//! Poller implementation.
//!
//! Each tick the poller contends for the distributed lock, and the winner
//! claims at most one due job and pushes its id onto the work queue. If
//! the push fails, the claim is rolled back so the job becomes due again
//! on a later tick. Losing the lock, finding nothing due, and losing a
//! version race are all quiet, ordinary outcomes.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PollerConfig;
use crate::core::job::JobStatus;
use crate::core::types::JobId;
use crate::events::{Event, EventBus};
use crate::lock::DistributedLock;
use crate::queue::WorkQueue;
use crate::storage::{JobStore, StorageError};

/// Buffer size for the command channel between PollerHandle and Poller.
const COMMAND_CHANNEL_BUFFER: usize = 32;

/// Errors surfaced through the poller handle.
#[derive(Debug, Error)]
pub enum PollerError {
    /// The poller task is gone or the channel is closed.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Commands that can be sent to the poller.
enum PollerCommand {
    /// Run one poll cycle immediately and report what was dispatched.
    TickNow {
        response: oneshot::Sender<Option<JobId>>,
    },
    /// Shutdown the poller.
    Shutdown { response: oneshot::Sender<()> },
}

/// Handle for controlling a running poller.
#[derive(Clone)]
pub struct PollerHandle {
    command_tx: mpsc::Sender<PollerCommand>,
}

impl PollerHandle {
    /// Run one poll cycle now, outside the interval schedule.
    ///
    /// Returns the id of the job dispatched by that cycle, if any.
    pub async fn tick_now(&self) -> Result<Option<JobId>, PollerError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(PollerCommand::TickNow {
                response: response_tx,
            })
            .await
            .map_err(|_| PollerError::Channel("failed to send tick command".to_string()))?;
        response_rx
            .await
            .map_err(|_| PollerError::Channel("failed to receive tick response".to_string()))
    }

    /// Shutdown the poller.
    pub async fn shutdown(&self) -> Result<(), PollerError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(PollerCommand::Shutdown {
                response: response_tx,
            })
            .await
            .map_err(|_| PollerError::Channel("failed to send shutdown command".to_string()))?;
        response_rx
            .await
            .map_err(|_| PollerError::Channel("failed to receive shutdown response".to_string()))
    }
}

/// The claim-and-enqueue poll loop.
pub struct Poller {
    store: Arc<dyn JobStore>,
    lock: Arc<dyn DistributedLock>,
    queue: Arc<dyn WorkQueue>,
    event_bus: Arc<EventBus>,
    config: PollerConfig,
}

impl Poller {
    /// Create a poller over the given backends.
    pub fn new(
        store: Arc<dyn JobStore>,
        lock: Arc<dyn DistributedLock>,
        queue: Arc<dyn WorkQueue>,
        config: PollerConfig,
    ) -> Self {
        Self {
            store,
            lock,
            queue,
            event_bus: Arc::new(EventBus::new()),
            config,
        }
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Start the poll loop and return a handle for controlling it.
    pub fn start(self) -> (PollerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        let handle = PollerHandle { command_tx };

        let poller_task = tokio::spawn(async move {
            self.run(command_rx).await;
        });

        (handle, poller_task)
    }

    /// Main poll loop.
    async fn run(self, mut command_rx: mpsc::Receiver<PollerCommand>) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        info!(
            identity = %self.config.identity,
            interval_ms = self.config.poll_interval.as_millis() as u64,
            "poller started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }

                Some(command) = command_rx.recv() => {
                    match command {
                        PollerCommand::TickNow { response } => {
                            let dispatched = self.tick().await;
                            let _ = response.send(dispatched);
                        }
                        PollerCommand::Shutdown { response } => {
                            info!(identity = %self.config.identity, "poller shutting down");
                            let _ = response.send(());
                            break;
                        }
                    }
                }
            }
        }
    }

    /// One poll cycle: lock, claim, enqueue, release.
    ///
    /// Returns the dispatched job id, or `None` when the cycle did nothing.
    async fn tick(&self) -> Option<JobId> {
        let token = match self
            .lock
            .try_acquire(&self.config.lock_key, self.config.lock_ttl)
            .await
        {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("poll lock held elsewhere, skipping cycle");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "failed to contend for poll lock");
                return None;
            }
        };

        let dispatched = self.claim_and_enqueue().await;

        match self.lock.release(&self.config.lock_key, &token).await {
            Ok(true) => {}
            Ok(false) => debug!("poll lock lease expired before release"),
            Err(e) => warn!(error = %e, "failed to release poll lock"),
        }

        dispatched
    }

    /// Claim the next due job and push it onto the queue, rolling the
    /// claim back when the push fails.
    async fn claim_and_enqueue(&self) -> Option<JobId> {
        let claimed = match self
            .store
            .claim_next_due(chrono::Utc::now(), &self.config.identity)
            .await
        {
            Ok(Some(job)) => job,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "failed to claim next due job");
                return None;
            }
        };

        let job_id = claimed.id;
        match self
            .queue
            .push(&self.config.queue_name, &job_id.to_string())
            .await
        {
            Ok(()) => {
                info!(job_id = %job_id, job_type = %claimed.job_type, "job dispatched to queue");
                self.event_bus
                    .emit(Event::job_claimed(job_id, &self.config.identity))
                    .await;
                Some(job_id)
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "enqueue failed, reverting claim");
                self.revert(claimed, e.to_string()).await;
                None
            }
        }
    }

    /// Put a claimed job back to pending so a later cycle retries it.
    async fn revert(&self, mut job: crate::core::job::Job, reason: String) {
        let job_id = job.id;
        let expected_version = job.version;
        if let Err(e) = job.transition(JobStatus::Pending, chrono::Utc::now()) {
            warn!(job_id = %job_id, error = %e, "cannot revert claimed job");
            return;
        }

        match self.store.save(job, expected_version).await {
            Ok(_) => {
                info!(job_id = %job_id, "claim reverted, job is pending again");
                self.event_bus
                    .emit(Event::job_reverted(job_id, reason))
                    .await;
            }
            // Someone else already advanced the record; leave it alone.
            Err(StorageError::Conflict(_)) => {
                debug!(job_id = %job_id, "revert lost a version race, leaving record as is");
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "failed to revert claim, job stuck running until operator intervenes");
            }
        }
    }
}
