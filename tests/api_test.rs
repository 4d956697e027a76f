use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::json;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

use vaultforge_worker::api::models::{JobRecordResponse, ProcessResponse};
use vaultforge_worker::api::state::AppState;
use vaultforge_worker::config::Config;
use vaultforge_worker::jobs::{FjallStore, JobStatus};
use vaultforge_worker::storage::StorageClient;

/// Builds a test app with an isolated ledger and in-memory storage.
async fn build_test_app() -> (Router, TempDir) {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let store_path = temp_dir.path().join("jobs.fjall");

    let store = FjallStore::open(&store_path).expect("failed to open test ledger");
    let storage = StorageClient::in_memory();

    let mut config = Config::load_from_path(std::path::PathBuf::from("__missing__.toml"))
        .expect("default config should load without a file present");
    config.job.temp_dir = temp_dir.path().to_path_buf();
    config.embedding.skip_embeddings = true;

    let state = AppState::new(config, store, storage);

    let app = Router::new()
        .route(
            "/process",
            axum::routing::post(vaultforge_worker::api::services::ingest_job),
        )
        .route(
            "/health",
            axum::routing::get(vaultforge_worker::api::services::health),
        )
        .route(
            "/operators/jobs/{job_id}",
            axum::routing::get(vaultforge_worker::api::services::get_job),
        )
        .route(
            "/operators/health",
            axum::routing::get(vaultforge_worker::api::services::operators_health),
        )
        .with_state(state)
        .layer(tower_http::decompression::RequestDecompressionLayer::new());

    (app, temp_dir)
}

fn process_request(job_id: &str, task: &str) -> serde_json::Value {
    json!({
        "jobId": job_id,
        "task": task,
        "data": { "inputDir": "/tmp/does-not-matter" },
        "callbackUrl": "http://127.0.0.1:0/callback",
    })
}

fn post_process_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .uri("/process")
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn process_accepts_known_task_and_returns_job_id() {
    let (app, _temp_dir) = build_test_app().await;

    let request = post_process_request(process_request("job-accept-1", "process-all"));
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let parsed: ProcessResponse = serde_json::from_slice(&body).unwrap();

    assert_eq!(parsed.job_id, "job-accept-1");
    assert!(parsed.message.is_none());
}

#[tokio::test]
async fn process_rejects_unknown_task_with_400() {
    let (app, _temp_dir) = build_test_app().await;

    let request = post_process_request(process_request("job-bad-task", "does-not-exist"));
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn process_rejects_missing_callback_url() {
    let (app, _temp_dir) = build_test_app().await;

    let mut body = process_request("job-missing-callback", "process-all");
    body["callbackUrl"] = json!("not-a-url");

    let response = app.oneshot(post_process_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn process_then_get_job_reports_accepted_status() {
    let (app, _temp_dir) = build_test_app().await;

    let request = post_process_request(process_request("job-lookup", "process-all"));
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The job runs asynchronously; immediately after acceptance the ledger
    // record exists with a known job/task pair regardless of how far the
    // background pipeline has progressed.
    let get_request = Request::builder()
        .uri("/operators/jobs/job-lookup")
        .method("GET")
        .body(Body::empty())
        .unwrap();

    let get_response = app.oneshot(get_request).await.unwrap();
    assert_eq!(get_response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(get_response.into_body(), usize::MAX)
        .await
        .unwrap();
    let snapshot: JobRecordResponse = serde_json::from_slice(&body).unwrap();

    assert_eq!(snapshot.job_id, "job-lookup");
    assert_eq!(snapshot.task, "process-all");
    assert!(matches!(
        snapshot.status,
        JobStatus::Accepted | JobStatus::Running | JobStatus::Completed | JobStatus::Failed
    ));
}

#[tokio::test]
async fn get_job_returns_404_for_unknown_job() {
    let (app, _temp_dir) = build_test_app().await;

    let request = Request::builder()
        .uri("/operators/jobs/nonexistent-job-id")
        .method("GET")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (app, _temp_dir) = build_test_app().await;

    let request = Request::builder()
        .uri("/health")
        .method("GET")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(health.get("status").and_then(|v| v.as_str()), Some("ok"));
    assert!(health.get("timestamp").is_some());
}

#[tokio::test]
async fn operators_health_includes_metrics() {
    let (app, _temp_dir) = build_test_app().await;

    let request = Request::builder()
        .uri("/operators/health")
        .method("GET")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert!(parsed.get("metrics").is_some());
}
