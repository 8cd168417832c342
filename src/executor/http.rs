//! HTTP executor: runs a job by making an outbound HTTP request.
//!
//! The payload names a URL and optionally a method, headers, and a JSON
//! body. A 2xx response completes the job; anything else fails it.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{ExecutionError, JobExecutor};
use crate::core::job::Job;

const JOB_TYPE: &str = "HTTP";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Payload shape understood by [`HttpExecutor`].
#[derive(Debug, Deserialize)]
pub struct HttpPayload {
    /// Target URL. Required.
    pub url: String,
    /// HTTP method; defaults to GET.
    pub method: Option<String>,
    /// Extra request headers. Hop-by-hop headers the client manages
    /// itself (Host, Content-Length) are ignored.
    pub headers: Option<HashMap<String, String>>,
    /// JSON request body.
    pub body: Option<serde_json::Value>,
}

/// Executor for `HTTP` jobs.
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    /// Create an executor with connect and request timeouts applied.
    pub fn new() -> Result<Self, ExecutionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(REQUEST_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExecutionError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

fn is_managed_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("content-length")
}

fn build_headers(
    payload_headers: Option<&HashMap<String, String>>,
    has_body: bool,
) -> Result<HeaderMap, ExecutionError> {
    let mut headers = HeaderMap::new();
    if let Some(extra) = payload_headers {
        for (name, value) in extra {
            if is_managed_header(name) {
                continue;
            }
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ExecutionError::InvalidPayload(format!("header name: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ExecutionError::InvalidPayload(format!("header value: {}", e)))?;
            headers.insert(name, value);
        }
    }
    if has_body && !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    Ok(headers)
}

#[async_trait]
impl JobExecutor for HttpExecutor {
    fn job_type(&self) -> &str {
        JOB_TYPE
    }

    async fn execute(&self, job: &Job) -> Result<(), ExecutionError> {
        let payload: HttpPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| ExecutionError::InvalidPayload(e.to_string()))?;

        let method = match payload.method.as_deref() {
            None => Method::GET,
            Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                .map_err(|e| ExecutionError::InvalidPayload(format!("method: {}", e)))?,
        };

        let headers = build_headers(payload.headers.as_ref(), payload.body.is_some())?;

        debug!(job_id = %job.id, method = %method, url = %payload.url, "dispatching http request");

        let mut request = self
            .client
            .request(method, &payload.url)
            .headers(headers);
        if let Some(body) = &payload.body {
            request = request.body(body.to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExecutionError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExecutionError::Failed(format!(
                "http status {} from {}",
                status, payload.url
            )));
        }
        Ok(())
    }
}
