//! Job executors and the registry that resolves them by job type.

mod http;

pub use http::{HttpExecutor, HttpPayload};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::core::job::Job;

/// Errors an executor can surface from a run.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The payload could not be interpreted by this executor.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// HTTP transport or status failure.
    #[error("http error: {0}")]
    Http(String),

    /// The work itself reported failure.
    #[error("execution failed: {0}")]
    Failed(String),
}

/// Something that can run a job of one specific type.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// The job type this executor handles. Matched exactly against
    /// `Job::job_type`.
    fn job_type(&self) -> &str;

    /// Run the job to completion.
    ///
    /// Payloads may be delivered more than once, so implementations should
    /// be idempotent where the side effect allows it.
    async fn execute(&self, job: &Job) -> Result<(), ExecutionError>;
}

/// Immutable mapping from job type to executor.
///
/// Built once at startup. When two executors claim the same type, the
/// first one registered wins and the duplicate is dropped with a warning.
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn JobExecutor>>,
}

impl ExecutorRegistry {
    /// Build a registry from executors in registration order.
    pub fn new(executors: Vec<Arc<dyn JobExecutor>>) -> Self {
        let mut map: HashMap<String, Arc<dyn JobExecutor>> = HashMap::new();
        for executor in executors {
            let job_type = executor.job_type().to_string();
            if map.contains_key(&job_type) {
                warn!(job_type = %job_type, "duplicate executor registration ignored");
                continue;
            }
            map.insert(job_type, executor);
        }
        Self { executors: map }
    }

    /// Resolve the executor for `job_type`, if any is registered.
    pub fn get(&self, job_type: &str) -> Option<&Arc<dyn JobExecutor>> {
        self.executors.get(job_type)
    }

    /// Number of registered executors.
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    /// Whether no executors are registered.
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}
