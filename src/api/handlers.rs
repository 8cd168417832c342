//! API request handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::core::job::Job;
use crate::core::types::JobId;
use crate::events::{Event, EventBus};
use crate::storage::JobStore;

use super::errors::ApiError;
use super::responses::{HealthResponse, JobListResponse, JobResponse};

/// Shared application state for API handlers.
pub struct ApiState<S: JobStore> {
    pub store: Arc<S>,
    pub event_bus: Arc<EventBus>,
}

impl<S: JobStore> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            event_bus: Arc::clone(&self.event_bus),
        }
    }
}

/// Body of a job submission.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    /// Registry key resolving to an executor.
    pub job_type: String,
    /// Opaque payload handed to the executor as-is.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Due time; omitted means due immediately.
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Submit a new job.
pub async fn submit_job<S: JobStore + 'static>(
    State(state): State<ApiState<S>>,
    Json(request): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<JobResponse>), ApiError> {
    if request.job_type.trim().is_empty() {
        return Err(ApiError::BadRequest("job_type must not be empty".to_string()));
    }

    let job = Job::new(
        request.job_type,
        request.payload,
        request.scheduled_at.unwrap_or_else(Utc::now),
    );
    let created = state.store.create(job).await?;

    state
        .event_bus
        .emit(Event::job_submitted(created.id, &created.job_type))
        .await;

    Ok((StatusCode::CREATED, Json(JobResponse::from(&created))))
}

/// List all jobs.
pub async fn list_jobs<S: JobStore + 'static>(
    State(state): State<ApiState<S>>,
) -> Result<Json<JobListResponse>, ApiError> {
    let jobs = state.store.list().await?;
    let jobs: Vec<JobResponse> = jobs.iter().map(JobResponse::from).collect();
    let count = jobs.len();
    Ok(Json(JobListResponse { jobs, count }))
}

/// Get a specific job.
pub async fn get_job<S: JobStore + 'static>(
    State(state): State<ApiState<S>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let job_id: JobId = job_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid job id: {}", job_id)))?;
    let job = state
        .store
        .find_by_id(&job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job not found: {}", job_id)))?;
    Ok(Json(JobResponse::from(&job)))
}
