use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Provider not found: {provider}")]
    ProviderNotFound { provider: String },

    #[error("Provider error from {provider} (status {status}): {body}")]
    Provider {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Connection failed to {provider}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error(
        "Timeout: {provider} job {job_id} did not finish within {waited_secs}s (last status: {last_status})"
    )]
    Timeout {
        provider: String,
        job_id: String,
        last_status: String,
        waited_secs: u64,
    },

    #[error("Job failed: {provider} job {job_id}: {reason}")]
    JobFailed {
        provider: String,
        job_id: String,
        reason: String,
    },

    #[error("No content found in {sources} source(s)")]
    NoContent { sources: usize },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Download failed for {url}: {message}")]
    Download { url: String, message: String },

    #[error("Upload failed for {filename}: {message}")]
    Upload { filename: String, message: String },

    #[error("Operation not found: {operation_id}")]
    OperationNotFound { operation_id: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Failure of a best-effort remote delete.
///
/// Never returned to callers; the lifecycle guard logs it and moves on.
#[derive(Error, Debug)]
#[error("Cleanup of {kind} artifact {artifact_id} on {provider} failed: {message}")]
pub struct CleanupError {
    pub provider: String,
    pub artifact_id: String,
    pub kind: String,
    pub message: String,
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation {
            message: message.into(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation { .. } => StatusCode::BAD_REQUEST,
            ServiceError::ProviderNotFound { .. }
            | ServiceError::OperationNotFound { .. }
            | ServiceError::FileNotFound { .. }
            | ServiceError::NoContent { .. } => StatusCode::NOT_FOUND,
            ServiceError::Provider { .. }
            | ServiceError::Transport { .. }
            | ServiceError::Download { .. } => StatusCode::BAD_GATEWAY,
            ServiceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::JobFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            // Non-standard "client closed request", as nginx uses it
            ServiceError::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ServiceError::Upload { .. } | ServiceError::Config { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Validation { .. } => "validation_error",
            ServiceError::ProviderNotFound { .. } => "provider_not_found",
            ServiceError::Provider { .. } => "provider_error",
            ServiceError::Transport { .. } => "provider_connection",
            ServiceError::Timeout { .. } => "timeout",
            ServiceError::JobFailed { .. } => "job_failed",
            ServiceError::NoContent { .. } => "no_content",
            ServiceError::Cancelled => "cancelled",
            ServiceError::Download { .. } => "download_error",
            ServiceError::Upload { .. } => "upload_error",
            ServiceError::OperationNotFound { .. } => "operation_not_found",
            ServiceError::FileNotFound { .. } => "file_not_found",
            ServiceError::Config { .. } => "config_error",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ServiceError::Provider { status, body, .. } => Some(serde_json::json!({
                "status": status,
                "body": body,
            })),
            ServiceError::Timeout {
                job_id,
                last_status,
                waited_secs,
                ..
            } => Some(serde_json::json!({
                "taskId": job_id,
                "lastStatus": last_status,
                "waitedSeconds": waited_secs,
            })),
            ServiceError::JobFailed { job_id, reason, .. } => Some(serde_json::json!({
                "taskId": job_id,
                "reason": reason,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let response = ErrorResponse {
            message: format_error_chain(&self),
            code: Some(self.error_code().to_string()),
            details: self.details(),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Render an error and its `source()` chain as a single line.
pub fn format_error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
