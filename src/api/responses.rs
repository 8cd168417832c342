//! API response types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::job::Job;

fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Job record for API responses. Timestamps are epoch milliseconds.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub status: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub scheduled_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub version: i64,
}

impl From<&Job> for JobResponse {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            status: job.status.to_string(),
            job_type: job.job_type.clone(),
            payload: job.payload.clone(),
            scheduled_at: to_millis(job.scheduled_at),
            started_at: job.started_at.map(to_millis),
            finished_at: job.finished_at.map(to_millis),
            version: job.version,
        }
    }
}

/// List of jobs response.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
    pub count: usize,
}
