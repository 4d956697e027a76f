//! Orchestrates a single job end to end (spec §4.10, §5): working directory
//! lifecycle, soft/hard timeouts, task dispatch, ledger updates, and the
//! terminal callback POST.

pub mod artifacts;
pub mod tasks;
pub mod workdir;

pub use tasks::{JobContext, PipelineError};

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::api::models::{CallbackBody, CallbackStatus};
use crate::api::state::AppState;
use crate::issues::IssueCollector;
use crate::jobs::JobStatus;

const SOFT_TIMEOUT_LOG_STAGE: &str = "job";

enum DispatchOutcome {
    Finished(Result<Value, PipelineError>),
    HardTimeout,
}

/// Races a job's dispatch future against the soft and hard timeouts
/// configured for the instance. The soft timeout only logs a warning (the
/// job keeps running); the hard timeout aborts the wait and fails the job,
/// though the spawned work underneath is not forcibly killed.
async fn run_with_timeouts(
    dispatch: impl std::future::Future<Output = Result<Value, PipelineError>>,
    job_id: &str,
    soft_timeout: Duration,
    hard_timeout: Duration,
) -> DispatchOutcome {
    tokio::pin!(dispatch);
    let soft = tokio::time::sleep(soft_timeout);
    tokio::pin!(soft);
    let hard = tokio::time::sleep(hard_timeout);
    tokio::pin!(hard);
    let mut soft_fired = false;

    loop {
        tokio::select! {
            result = &mut dispatch => return DispatchOutcome::Finished(result),
            _ = &mut soft, if !soft_fired => {
                soft_fired = true;
                warn!(job_id, seconds = soft_timeout.as_secs(), "job exceeded soft timeout, still running");
            }
            _ = &mut hard => return DispatchOutcome::HardTimeout,
        }
    }
}

async fn post_callback(state: &AppState, body: &CallbackBody, callback_url: &str) {
    match state.http_client.post(callback_url).json(body).send().await {
        Ok(response) if !response.status().is_success() => {
            warn!(job_id = %body.job_id, status = %response.status(), "callback endpoint returned non-2xx");
        }
        Ok(_) => {}
        Err(e) => {
            error!(job_id = %body.job_id, error = %e, "failed to deliver callback");
        }
    }
}

/// Runs a single accepted job to completion: creates its working directory,
/// dispatches the task, persists the terminal ledger state, and delivers
/// exactly one callback.
pub async fn run_job(state: Arc<AppState>, job_id: String, task: String, data: Value, callback_url: String) {
    let cancel = state.register_job(&job_id);
    let config = state.config.clone();
    let started_at = chrono::Utc::now();

    let workdir = match workdir::WorkDir::create(&config.job.temp_dir, &job_id, config.job.keep_tmp_files) {
        Ok(w) => w,
        Err(e) => {
            finish_failed(&state, &job_id, &callback_url, started_at, format!("failed to create job working directory: {e}"), Vec::new()).await;
            state.forget_job(&job_id);
            return;
        }
    };

    if let Err(e) = mark_running(&state, &job_id) {
        warn!(job_id, error = %e, "failed to persist running status");
    }
    let _ = state.store.append_log(&job_id, "info", format!("task '{task}' started"));

    let ctx = JobContext {
        job_id: job_id.clone(),
        config: config.clone(),
        storage: state.storage.clone(),
        issues: IssueCollector::new(),
        cancel: cancel.clone(),
    };

    let soft_timeout = Duration::from_secs(config.job.soft_timeout_secs);
    let hard_timeout = Duration::from_secs(config.job.hard_timeout_secs);
    let dispatch = tasks::dispatch(&task, &data, &ctx, workdir.root());

    let outcome = run_with_timeouts(dispatch, &job_id, soft_timeout, hard_timeout).await;

    let logs = state.store.read_logs(&job_id).map(|entries| entries.into_iter().map(|l| l.message).collect()).unwrap_or_default();

    match outcome {
        DispatchOutcome::Finished(Ok(result)) => {
            info!(job_id, "job completed");
            state.metrics.job_completed();
            let _ = state.store.append_log(&job_id, "info", "task completed");
            finish_completed(&state, &job_id, &callback_url, started_at, result, logs).await;
        }
        DispatchOutcome::Finished(Err(e)) => {
            error!(job_id, error = %e, "job failed");
            state.metrics.job_failed();
            let _ = state.store.append_log(&job_id, "error", e.to_string());
            finish_failed(&state, &job_id, &callback_url, started_at, e.to_string(), logs).await;
        }
        DispatchOutcome::HardTimeout => {
            error!(job_id, seconds = hard_timeout.as_secs(), "job exceeded hard timeout");
            cancel.cancel();
            state.metrics.job_failed();
            let message = format!("job exceeded hard timeout of {}s", hard_timeout.as_secs());
            let _ = state.store.append_log(&job_id, "error", message.clone());
            finish_failed(&state, &job_id, &callback_url, started_at, message, logs).await;
        }
    }

    state.forget_job(&job_id);
    drop(workdir);
}

fn mark_running(state: &AppState, job_id: &str) -> crate::jobs::Result<()> {
    if let Some(mut record) = state.store.get(job_id)? {
        record.status = JobStatus::Running;
        record.updated_at = chrono::Utc::now();
        state.store.upsert(&record)?;
    }
    Ok(())
}

async fn finish_completed(
    state: &AppState,
    job_id: &str,
    callback_url: &str,
    started_at: chrono::DateTime<chrono::Utc>,
    result: Value,
    logs: Vec<String>,
) {
    let now = chrono::Utc::now();
    if let Ok(Some(mut record)) = state.store.get(job_id) {
        record.status = JobStatus::Completed;
        record.result = Some(result.clone());
        record.updated_at = now;
        let _ = state.store.upsert(&record);
    }
    let body = CallbackBody {
        job_id: job_id.to_string(),
        status: CallbackStatus::Completed,
        result: Some(result),
        error: None,
        processed_at: now,
        duration_ms: Some((now - started_at).num_milliseconds().max(0) as u64),
        logs,
    };
    post_callback(state, &body, callback_url).await;
}

async fn finish_failed(
    state: &AppState,
    job_id: &str,
    callback_url: &str,
    started_at: chrono::DateTime<chrono::Utc>,
    error_message: String,
    logs: Vec<String>,
) {
    let now = chrono::Utc::now();
    if let Ok(Some(mut record)) = state.store.get(job_id) {
        record.status = JobStatus::Failed;
        record.error = Some(error_message.clone());
        record.updated_at = now;
        let _ = state.store.upsert(&record);
    }
    let body = CallbackBody {
        job_id: job_id.to_string(),
        status: CallbackStatus::Failed,
        result: None,
        error: Some(error_message),
        processed_at: now,
        duration_ms: Some((now - started_at).num_milliseconds().max(0) as u64),
        logs,
    };
    post_callback(state, &body, callback_url).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::jobs::{FjallStore, JobRecord};
    use crate::storage::StorageClient;

    async fn test_state() -> (Arc<AppState>, tempfile::TempDir, tempfile::TempDir) {
        let mut config = Config::load_from_path(std::path::PathBuf::from("__missing__.toml")).unwrap();
        config.embedding.skip_embeddings = true;
        let temp = tempfile::tempdir().unwrap();
        config.job.temp_dir = temp.path().to_path_buf();
        let (store, store_guard) = FjallStore::open_temp().unwrap();
        let state = AppState::new(config, store, StorageClient::in_memory());
        (Arc::new(state), temp, store_guard)
    }

    #[tokio::test]
    async fn run_job_completes_process_all_and_marks_ledger() {
        let (state, _temp, _store_guard) = test_state().await;
        let vault = tempfile::tempdir().unwrap();
        std::fs::write(vault.path().join("note.md"), "# Hello\n").unwrap();

        let job_id = "job-complete".to_string();
        state
            .store
            .upsert(&JobRecord::new(job_id.clone(), "process-all".to_string(), None))
            .unwrap();

        let data = serde_json::json!({ "inputDir": vault.path().to_string_lossy() });
        run_job(state.clone(), job_id.clone(), "process-all".to_string(), data, "http://127.0.0.1:0/callback".to_string()).await;

        let record = state.store.get(&job_id).unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn run_job_fails_on_unknown_task() {
        let (state, _temp, _store_guard) = test_state().await;
        let job_id = "job-fail".to_string();
        state
            .store
            .upsert(&JobRecord::new(job_id.clone(), "not-a-task".to_string(), None))
            .unwrap();

        run_job(state.clone(), job_id.clone(), "not-a-task".to_string(), serde_json::json!({}), "http://127.0.0.1:0/callback".to_string()).await;

        let record = state.store.get(&job_id).unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.error.unwrap().contains("unknown task"));
    }
}
