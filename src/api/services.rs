//! HTTP handlers for the job-submission and operator surfaces (spec §6).
//!
//! - `POST /process` accepts a job and returns `200`/`400` synchronously
//!   (the `Received -> Accepted` transition); the remainder of the pipeline
//!   runs on a detached task and delivers exactly one callback.
//! - `GET /health` is a liveness probe.
//! - `GET /operators/jobs/{jobId}` exposes the ledger record for a job.
//! - `GET /operators/health` adds in-process metrics for operators.

use std::sync::Arc;

use axum::{Json, extract::Path, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{info, warn};

use super::{
    error::ApiError,
    models::{
        HealthResponse, JobRecordResponse, OperatorsHealthResponse, ProcessRequest,
        ProcessResponse,
    },
    state::AppState,
    utils::redact_sensitive_values,
    validation::validate_process_request,
};
use crate::jobs::JobRecord;
use crate::pipeline;

/// `POST /process` (spec §6). Validates the request, persists an
/// `Accepted` ledger record, spawns the pipeline, and returns immediately.
pub async fn ingest_job(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Err(e) = validate_process_request(&request) {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ProcessResponse::error(request.job_id, e.to_string())),
        ));
    }

    info!(
        job_id = %request.job_id,
        task = %request.task,
        data = %redact_sensitive_values(&request.data),
        "job accepted"
    );

    let record = JobRecord::new(
        request.job_id.clone(),
        request.task.clone(),
        Some(request.callback_url.clone()),
    );
    state.store.upsert(&record)?;
    state.metrics.job_accepted();

    let state = Arc::new(state);
    tokio::spawn(pipeline::run_job(
        state,
        request.job_id.clone(),
        request.task,
        request.data,
        request.callback_url,
    ));

    Ok((
        StatusCode::OK,
        Json(ProcessResponse::accepted(request.job_id)),
    ))
}

/// `GET /operators/jobs/{jobId}`: a snapshot of the ledger record.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .store
        .get(&job_id)?
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;

    Ok((StatusCode::OK, Json(JobRecordResponse::from(record))))
}

/// `GET /health` (spec §6): unauthenticated liveness probe.
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse::default()))
}

/// `GET /operators/health`: liveness plus in-process metrics.
pub async fn operators_health(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();
    match state.store.stats() {
        Ok(_) => {}
        Err(e) => warn!(error = %e, "ledger stats unavailable"),
    }

    (
        StatusCode::OK,
        Json(OperatorsHealthResponse {
            status: "ok",
            timestamp: chrono::Utc::now(),
            metrics: snapshot,
        }),
    )
}
