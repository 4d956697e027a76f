use thiserror::Error;

use super::models::ProcessRequest;

/// The task names the job router knows how to dispatch (spec §5).
pub const KNOWN_TASKS: &[&str] = &[
    "process-all",
    "deploy-repo",
    "process-with-repo",
    "wp-import",
    "publish-r2",
    "generate-and-deploy-project",
];

#[derive(Debug, Error)]
pub enum ProcessRequestValidationError {
    #[error("jobId must not be empty")]
    EmptyJobId,
    #[error("task must not be empty")]
    EmptyTask,
    #[error("unknown task '{0}'")]
    UnknownTask(String),
    #[error("callbackUrl must be an http/https url")]
    InvalidCallbackUrl,
}

pub fn validate_process_request(request: &ProcessRequest) -> Result<(), ProcessRequestValidationError> {
    if request.job_id.trim().is_empty() {
        return Err(ProcessRequestValidationError::EmptyJobId);
    }

    if request.task.trim().is_empty() {
        return Err(ProcessRequestValidationError::EmptyTask);
    }

    if !KNOWN_TASKS.contains(&request.task.as_str()) {
        return Err(ProcessRequestValidationError::UnknownTask(request.task.clone()));
    }

    if !request.callback_url.starts_with("http://") && !request.callback_url.starts_with("https://") {
        return Err(ProcessRequestValidationError::InvalidCallbackUrl);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_request() -> ProcessRequest {
        ProcessRequest {
            job_id: "job-1".to_string(),
            task: "process-all".to_string(),
            data: json!({ "repoUrl": "https://github.com/example/vault.git" }),
            callback_url: "https://example.com/callback".to_string(),
        }
    }

    #[test]
    fn validate_process_request_accepts_valid_payload() {
        assert!(validate_process_request(&sample_request()).is_ok());
    }

    #[test]
    fn validate_process_request_rejects_unknown_task() {
        let mut request = sample_request();
        request.task = "do-everything".to_string();

        let err = validate_process_request(&request).unwrap_err();
        assert!(matches!(err, ProcessRequestValidationError::UnknownTask(_)));
    }

    #[test]
    fn validate_process_request_rejects_bad_callback_url() {
        let mut request = sample_request();
        request.callback_url = "ftp://example.com/callback".to_string();

        let err = validate_process_request(&request).unwrap_err();
        assert!(matches!(err, ProcessRequestValidationError::InvalidCallbackUrl));
    }

    #[test]
    fn validate_process_request_rejects_empty_job_id() {
        let mut request = sample_request();
        request.job_id = "  ".to_string();

        let err = validate_process_request(&request).unwrap_err();
        assert!(matches!(err, ProcessRequestValidationError::EmptyJobId));
    }
}
