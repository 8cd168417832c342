//! Common test utilities shared across integration tests.

use relais::{Job, JobId, JobStatus, JobStore};
use std::time::Duration;

/// Wait for a job to reach an expected status, polling storage.
///
/// This is more reliable than fixed sleeps since execution time can vary.
/// Polls storage every 10ms and times out after the specified duration.
///
/// # Panics
///
/// Panics if the timeout is reached before the job reaches the expected status.
pub async fn wait_for_job_status(
    store: &dyn JobStore,
    job_id: &JobId,
    expected: JobStatus,
    timeout: Duration,
) -> Job {
    let start = tokio::time::Instant::now();
    loop {
        let job = store.find_by_id(job_id).await.unwrap().unwrap();
        if job.status == expected {
            return job;
        }
        if start.elapsed() > timeout {
            panic!(
                "Timeout waiting for job {} to reach {:?}, current status: {:?}",
                job_id, expected, job.status
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
