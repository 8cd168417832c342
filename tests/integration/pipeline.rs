//! Full pipeline tests: submit, claim, enqueue, execute, finalize.

use relais::{
    ExecutionError, ExecutorRegistry, InMemoryLock, InMemoryQueue, InMemoryStore, Job, JobExecutor,
    JobStatus, JobStore, Poller, PollerConfig, QueueError, WorkQueue, WorkerConfig, WorkerPool,
    WORK_QUEUE,
};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::common::wait_for_job_status;

const WAIT: Duration = Duration::from_secs(5);

/// Executor that records how many times it ran and can be told to fail.
struct RecordingExecutor {
    job_type: String,
    calls: AtomicUsize,
    fail_with: Option<String>,
}

impl RecordingExecutor {
    fn succeeding(job_type: &str) -> Arc<Self> {
        Arc::new(Self {
            job_type: job_type.to_string(),
            calls: AtomicUsize::new(0),
            fail_with: None,
        })
    }

    fn failing(job_type: &str, error: &str) -> Arc<Self> {
        Arc::new(Self {
            job_type: job_type.to_string(),
            calls: AtomicUsize::new(0),
            fail_with: Some(error.to_string()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobExecutor for RecordingExecutor {
    fn job_type(&self) -> &str {
        &self.job_type
    }

    async fn execute(&self, _job: &Job) -> Result<(), ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(error) => Err(ExecutionError::Failed(error.clone())),
            None => Ok(()),
        }
    }
}

/// Queue wrapper that fails a configurable number of pushes before
/// delegating to a real queue.
struct FlakyQueue {
    inner: Arc<InMemoryQueue>,
    failures_left: AtomicUsize,
}

#[async_trait]
impl WorkQueue for FlakyQueue {
    async fn push(&self, queue: &str, entry: &str) -> Result<(), QueueError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(QueueError::Backend("connection reset".to_string()));
        }
        self.inner.push(queue, entry).await
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, QueueError> {
        self.inner.pop(queue, timeout).await
    }
}

struct Pipeline {
    store: Arc<InMemoryStore>,
    queue: Arc<InMemoryQueue>,
    lock: Arc<InMemoryLock>,
}

impl Pipeline {
    fn new() -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            queue: Arc::new(InMemoryQueue::new()),
            lock: Arc::new(InMemoryLock::new()),
        }
    }

    fn poller(&self, identity: &str) -> Poller {
        Poller::new(
            self.store.clone(),
            self.lock.clone(),
            self.queue.clone(),
            PollerConfig::default()
                .with_poll_interval(Duration::from_millis(20))
                .with_identity(identity),
        )
    }

    fn workers(&self, executors: Vec<Arc<dyn JobExecutor>>) -> WorkerPool {
        WorkerPool::new(
            self.store.clone(),
            self.queue.clone(),
            Arc::new(ExecutorRegistry::new(executors)),
            WorkerConfig::default()
                .with_worker_count(2)
                .with_pop_timeout(Duration::from_millis(20))
                .with_shutdown_timeout(Duration::from_secs(2)),
        )
    }

    async fn submit_due(&self, job_type: &str) -> Job {
        self.store
            .create(Job::new(
                job_type,
                json!({"url": "http://example/x"}),
                Utc::now() - ChronoDuration::seconds(1),
            ))
            .await
            .unwrap()
    }
}

/// Test: A due job flows from pending to completed without intervention.
#[tokio::test]
async fn test_due_job_runs_to_completion() {
    let pipeline = Pipeline::new();
    let executor = RecordingExecutor::succeeding("HTTP");

    let (poller_handle, poller_task) = pipeline.poller("node-a").start();
    let pool_handle = pipeline.workers(vec![executor.clone()]).start();

    let job = pipeline.submit_due("HTTP").await;
    let finished =
        wait_for_job_status(&*pipeline.store, &job.id, JobStatus::Completed, WAIT).await;

    assert_eq!(executor.calls(), 1);
    assert!(finished.started_at.is_some());
    assert!(finished.finished_at.is_some());
    assert_eq!(finished.claimed_by.as_deref(), Some("node-a"));
    // Claim bumped the version, finalization bumped it again.
    assert_eq!(finished.version, 2);

    poller_handle.shutdown().await.unwrap();
    poller_task.await.unwrap();
    pool_handle.shutdown().await;
}

/// Test: A failing execution ends the job as failed, with no retry.
#[tokio::test]
async fn test_failed_execution_is_terminal() {
    let pipeline = Pipeline::new();
    let executor = RecordingExecutor::failing("HTTP", "boom");

    let (poller_handle, poller_task) = pipeline.poller("node-a").start();
    let pool_handle = pipeline.workers(vec![executor.clone()]).start();

    let job = pipeline.submit_due("HTTP").await;
    let finished = wait_for_job_status(&*pipeline.store, &job.id, JobStatus::Failed, WAIT).await;

    assert!(finished.started_at.is_some());
    assert!(finished.finished_at.is_none());

    // Give the pipeline time to (incorrectly) retry; it must not.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(executor.calls(), 1);
    let stored = pipeline.store.find_by_id(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);

    poller_handle.shutdown().await.unwrap();
    poller_task.await.unwrap();
    pool_handle.shutdown().await;
}

/// Test: A job whose type has no executor fails without executing anything.
#[tokio::test]
async fn test_unknown_job_type_fails() {
    let pipeline = Pipeline::new();
    let executor = RecordingExecutor::succeeding("HTTP");

    let (poller_handle, poller_task) = pipeline.poller("node-a").start();
    let pool_handle = pipeline.workers(vec![executor.clone()]).start();

    let job = pipeline.submit_due("SHELL").await;
    wait_for_job_status(&*pipeline.store, &job.id, JobStatus::Failed, WAIT).await;
    assert_eq!(executor.calls(), 0);

    poller_handle.shutdown().await.unwrap();
    poller_task.await.unwrap();
    pool_handle.shutdown().await;
}

/// Test: Jobs scheduled in the future stay pending.
#[tokio::test]
async fn test_future_job_is_not_dispatched() {
    let pipeline = Pipeline::new();
    let executor = RecordingExecutor::succeeding("HTTP");

    let (poller_handle, poller_task) = pipeline.poller("node-a").start();
    let pool_handle = pipeline.workers(vec![executor.clone()]).start();

    let job = pipeline
        .store
        .create(Job::new(
            "HTTP",
            json!({}),
            Utc::now() + ChronoDuration::hours(1),
        ))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let stored = pipeline.store.find_by_id(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(executor.calls(), 0);

    poller_handle.shutdown().await.unwrap();
    poller_task.await.unwrap();
    pool_handle.shutdown().await;
}

/// Test: When the enqueue fails, the claim is rolled back and a later
/// poll cycle delivers the job anyway.
#[tokio::test]
async fn test_enqueue_failure_recovers_on_a_later_cycle() {
    let pipeline = Pipeline::new();
    let executor = RecordingExecutor::succeeding("HTTP");

    // First two pushes fail, then the queue heals.
    let flaky = Arc::new(FlakyQueue {
        inner: pipeline.queue.clone(),
        failures_left: AtomicUsize::new(2),
    });
    let poller = Poller::new(
        pipeline.store.clone(),
        pipeline.lock.clone(),
        flaky,
        PollerConfig::default()
            .with_poll_interval(Duration::from_millis(20))
            .with_identity("node-a"),
    );

    let (poller_handle, poller_task) = poller.start();
    let pool_handle = pipeline.workers(vec![executor.clone()]).start();

    let job = pipeline.submit_due("HTTP").await;
    let finished =
        wait_for_job_status(&*pipeline.store, &job.id, JobStatus::Completed, WAIT).await;

    assert_eq!(executor.calls(), 1);
    // Two failed claims reverted, the third claim stuck: five version bumps
    // before finalization.
    assert_eq!(finished.version, 6);

    poller_handle.shutdown().await.unwrap();
    poller_task.await.unwrap();
    pool_handle.shutdown().await;
}

/// Test: Two pollers contending over one store dispatch each job once.
#[tokio::test]
async fn test_competing_pollers_dispatch_each_job_once() {
    let pipeline = Pipeline::new();
    let executor = RecordingExecutor::succeeding("HTTP");

    let (handle_a, task_a) = pipeline.poller("node-a").start();
    let (handle_b, task_b) = pipeline.poller("node-b").start();
    let pool_handle = pipeline.workers(vec![executor.clone()]).start();

    let mut ids = vec![];
    for _ in 0..5 {
        ids.push(pipeline.submit_due("HTTP").await.id);
    }
    for id in &ids {
        wait_for_job_status(&*pipeline.store, id, JobStatus::Completed, WAIT).await;
    }
    assert_eq!(executor.calls(), 5);

    handle_a.shutdown().await.unwrap();
    handle_b.shutdown().await.unwrap();
    task_a.await.unwrap();
    task_b.await.unwrap();
    pool_handle.shutdown().await;
}

/// Test: A duplicate queue delivery of a finished job is absorbed.
#[tokio::test]
async fn test_duplicate_delivery_is_not_re_executed() {
    let pipeline = Pipeline::new();
    let executor = RecordingExecutor::succeeding("HTTP");

    let (poller_handle, poller_task) = pipeline.poller("node-a").start();
    let pool_handle = pipeline.workers(vec![executor.clone()]).start();

    let job = pipeline.submit_due("HTTP").await;
    wait_for_job_status(&*pipeline.store, &job.id, JobStatus::Completed, WAIT).await;

    pipeline
        .queue
        .push(WORK_QUEUE, &job.id.to_string())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(executor.calls(), 1);
    let stored = pipeline.store.find_by_id(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);

    poller_handle.shutdown().await.unwrap();
    poller_task.await.unwrap();
    pool_handle.shutdown().await;
}

/// Test: Many due jobs all complete exactly once across the pool.
#[tokio::test]
async fn test_burst_of_jobs_all_complete() {
    let pipeline = Pipeline::new();
    let executor = RecordingExecutor::succeeding("HTTP");

    let (poller_handle, poller_task) = pipeline.poller("node-a").start();
    let pool_handle = pipeline.workers(vec![executor.clone()]).start();

    let mut ids = vec![];
    for _ in 0..20 {
        ids.push(pipeline.submit_due("HTTP").await.id);
    }
    for id in &ids {
        wait_for_job_status(&*pipeline.store, id, JobStatus::Completed, WAIT).await;
    }
    assert_eq!(executor.calls(), 20);

    poller_handle.shutdown().await.unwrap();
    poller_task.await.unwrap();
    pool_handle.shutdown().await;
}
