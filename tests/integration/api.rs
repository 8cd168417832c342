//! API integration tests.
//!
//! These tests drive the router directly with tower's `oneshot`, no
//! listening socket involved.

use relais::api::{build_router, ApiState};
use relais::{EventBus, InMemoryStore, Job, JobStatus, JobStore};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration as ChronoDuration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_state() -> ApiState<InMemoryStore> {
    ApiState {
        store: Arc::new(InMemoryStore::new()),
        event_bus: Arc::new(EventBus::new()),
    }
}

async fn response_json(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Test: Health endpoint responds with status ok.
#[tokio::test]
async fn test_health_endpoint() {
    let router = build_router(create_test_state());

    let request = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

/// Test: Submitting a job returns 201 and a pending record.
#[tokio::test]
async fn test_submit_job() {
    let state = create_test_state();
    let router = build_router(state.clone());

    let response = router
        .oneshot(post_json(
            "/api/jobs",
            json!({
                "job_type": "HTTP",
                "payload": {"url": "http://example/hook"}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = response_json(response).await;
    assert_eq!(json["status"], "pending");
    assert_eq!(json["job_type"], "HTTP");
    assert_eq!(json["payload"]["url"], "http://example/hook");
    assert_eq!(json["version"], 0);

    // The record landed in storage.
    let id = json["id"].as_str().unwrap().parse().unwrap();
    let stored = state.store.find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
}

/// Test: Omitted scheduled_at means due now.
#[tokio::test]
async fn test_submit_without_schedule_is_due_immediately() {
    let state = create_test_state();
    let router = build_router(state.clone());

    let before = Utc::now();
    let response = router
        .oneshot(post_json("/api/jobs", json!({"job_type": "HTTP"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = response_json(response).await;
    let id = json["id"].as_str().unwrap().parse().unwrap();
    let stored = state.store.find_by_id(&id).await.unwrap().unwrap();
    assert!(stored.scheduled_at >= before);
    assert!(stored.is_due(Utc::now() + ChronoDuration::seconds(1)));
}

/// Test: An explicit future schedule is preserved.
#[tokio::test]
async fn test_submit_with_future_schedule() {
    let state = create_test_state();
    let router = build_router(state.clone());

    let due = Utc::now() + ChronoDuration::hours(2);
    let response = router
        .oneshot(post_json(
            "/api/jobs",
            json!({"job_type": "HTTP", "scheduled_at": due}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = response_json(response).await;
    assert_eq!(json["scheduled_at"], due.timestamp_millis());
}

/// Test: An empty job_type is rejected.
#[tokio::test]
async fn test_submit_with_empty_job_type_is_rejected() {
    let router = build_router(create_test_state());

    let response = router
        .oneshot(post_json("/api/jobs", json!({"job_type": "  "})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
}

/// Test: Get a submitted job by id.
#[tokio::test]
async fn test_get_job_endpoint() {
    let state = create_test_state();
    let job = state
        .store
        .create(Job::new("HTTP", json!({"url": "http://example/x"}), Utc::now()))
        .await
        .unwrap();
    let router = build_router(state);

    let request = Request::builder()
        .uri(format!("/api/jobs/{}", job.id))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["id"], job.id.to_string());
    assert_eq!(json["status"], "pending");
}

/// Test: Get with an unknown id returns 404.
#[tokio::test]
async fn test_get_unknown_job_returns_404() {
    let router = build_router(create_test_state());

    let request = Request::builder()
        .uri(format!("/api/jobs/{}", relais::JobId::new()))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Test: Get with a malformed id returns 400.
#[tokio::test]
async fn test_get_with_malformed_id_returns_400() {
    let router = build_router(create_test_state());

    let request = Request::builder()
        .uri("/api/jobs/not-a-uuid")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Test: List returns all jobs in submission order.
#[tokio::test]
async fn test_list_jobs_endpoint() {
    let state = create_test_state();
    let first = state
        .store
        .create(Job::new("HTTP", json!({}), Utc::now()))
        .await
        .unwrap();
    let second = state
        .store
        .create(Job::new("SHELL", json!({}), Utc::now()))
        .await
        .unwrap();
    let router = build_router(state);

    let request = Request::builder()
        .uri("/api/jobs")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["count"], 2);
    assert_eq!(json["jobs"][0]["id"], first.id.to_string());
    assert_eq!(json["jobs"][1]["id"], second.id.to_string());
}
