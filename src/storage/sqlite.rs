//! SQLite storage implementation.
//!
//! Persistent backend with automatic schema migration. The claim is a
//! single UPDATE whose target row is picked by a subquery, so concurrent
//! pollers cannot claim the same job twice; the version guard on `save` is
//! a `WHERE version = ?` clause.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use super::{JobStore, StorageError};
use crate::core::job::{Job, JobStatus};
use crate::core::types::JobId;

/// SQLite storage backend.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database file and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path_str = path.as_ref().to_string_lossy();
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path_str))
            .map_err(|e| StorageError::Other(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (useful for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        let schema = include_str!("../../migrations/001_initial_schema.sql");
        sqlx::raw_sql(schema)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(format!("migration failed: {}", e)))?;
        Ok(())
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// Helper functions for time and payload conversion
fn datetime_to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}

type JobRow = (
    String,
    String,
    String,
    String,
    i64,
    Option<i64>,
    Option<i64>,
    Option<String>,
    i64,
);

fn row_to_job(row: JobRow) -> Result<Job, StorageError> {
    Ok(Job {
        id: row
            .0
            .parse()
            .map_err(|e| StorageError::Other(format!("invalid uuid: {}", e)))?,
        status: row
            .1
            .parse::<JobStatus>()
            .map_err(StorageError::Other)?,
        job_type: row.2,
        payload: serde_json::from_str(&row.3)
            .map_err(|e| StorageError::Other(format!("invalid payload: {}", e)))?,
        scheduled_at: millis_to_datetime(row.4),
        started_at: row.5.map(millis_to_datetime),
        finished_at: row.6.map(millis_to_datetime),
        claimed_by: row.7,
        version: row.8,
    })
}

const JOB_COLUMNS: &str =
    "id, status, job_type, payload, scheduled_at, started_at, finished_at, claimed_by, version";

#[async_trait]
impl JobStore for SqliteStore {
    async fn create(&self, mut job: Job) -> Result<Job, StorageError> {
        job.version = 0;
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, status, job_type, payload, scheduled_at, started_at, finished_at, claimed_by, version, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.status.as_str())
        .bind(&job.job_type)
        .bind(job.payload.to_string())
        .bind(datetime_to_millis(job.scheduled_at))
        .bind(job.started_at.map(datetime_to_millis))
        .bind(job.finished_at.map(datetime_to_millis))
        .bind(&job.claimed_by)
        .bind(job.version)
        .bind(datetime_to_millis(Utc::now()))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(job),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::DuplicateKey(format!("job: {}", job.id)))
            }
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>, StorageError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        row.map(row_to_job).transpose()
    }

    async fn list(&self) -> Result<Vec<Job>, StorageError> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM jobs ORDER BY rowid",
            JOB_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        rows.into_iter().map(row_to_job).collect()
    }

    async fn claim_next_due(
        &self,
        now: DateTime<Utc>,
        claimed_by: &str,
    ) -> Result<Option<Job>, StorageError> {
        // Select-and-update in one statement; SQLite serializes writers, so
        // at most one caller gets the row.
        let row: Option<JobRow> = sqlx::query_as(&format!(
            r#"
            UPDATE jobs
            SET status = 'running', started_at = ?, claimed_by = ?, version = version + 1
            WHERE id = (
                SELECT id FROM jobs
                WHERE status = 'pending' AND scheduled_at <= ?
                ORDER BY scheduled_at ASC, rowid ASC
                LIMIT 1
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(datetime_to_millis(now))
        .bind(claimed_by)
        .bind(datetime_to_millis(now))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        row.map(row_to_job).transpose()
    }

    async fn save(&self, mut job: Job, expected_version: i64) -> Result<Job, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, payload = ?, scheduled_at = ?, started_at = ?, finished_at = ?, claimed_by = ?, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.payload.to_string())
        .bind(datetime_to_millis(job.scheduled_at))
        .bind(job.started_at.map(datetime_to_millis))
        .bind(job.finished_at.map(datetime_to_millis))
        .bind(&job.claimed_by)
        .bind(job.id.to_string())
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        if result.rows_affected() == 0 {
            // Distinguish a stale version from a missing row.
            return match self.find_by_id(&job.id).await? {
                Some(current) => Err(StorageError::Conflict(format!(
                    "job {} is at version {}, expected {}",
                    job.id, current.version, expected_version
                ))),
                None => Err(StorageError::NotFound(format!("job: {}", job.id))),
            };
        }

        job.version = expected_version + 1;
        Ok(job)
    }
}
