//! API models for the job-submission and operator surfaces (spec §6, §6a).
//!
//! - `POST /process` accepts a [`ProcessRequest`] and responds with a
//!   [`ProcessResponse`] (200 accepted, 400 malformed).
//! - `GET /health` responds with [`HealthResponse`].
//! - `GET /operators/jobs/{jobId}` responds with [`JobRecordResponse`].
//! - `GET /operators/health` responds with [`OperatorsHealthResponse`],
//!   wrapping a [`crate::observability::MetricsSnapshot`].
//! - Exactly one [`CallbackBody`] is POSTed to the job's `callbackUrl` once
//!   processing reaches a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jobs::{JobRecord, JobStatus};

/// Body of `POST /process`.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub job_id: String,
    pub task: String,
    #[serde(default)]
    pub data: Value,
    pub callback_url: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AcceptStatus {
    Accepted,
    Error,
}

/// Response to `POST /process`.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub status: AcceptStatus,
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProcessResponse {
    pub fn accepted(job_id: impl Into<String>) -> Self {
        Self {
            status: AcceptStatus::Accepted,
            job_id: job_id.into(),
            message: None,
        }
    }

    pub fn error(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: AcceptStatus::Error,
            job_id: job_id.into(),
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok",
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

/// Body POSTed exactly once to a job's `callbackUrl` on completion or
/// failure (spec §6).
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CallbackBody {
    pub job_id: String,
    pub status: CallbackStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub logs: Vec<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    Completed,
    Failed,
}

/// `GET /operators/jobs/{jobId}` response: a snapshot of the ledger record.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JobRecordResponse {
    pub job_id: String,
    pub task: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<JobRecord> for JobRecordResponse {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            task: record.task,
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
            result: record.result,
            error: record.error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OperatorsHealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub metrics: crate::observability::MetricsSnapshot,
}
