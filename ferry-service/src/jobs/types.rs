//! Data carried through one job's lifecycle.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::status::JobStatus;
use crate::error::{ServiceError, ServiceResult};

/// What a remote artifact is, which decides the delete endpoint used for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Input,
    Job,
    Output,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Input => write!(f, "input"),
            ArtifactKind::Job => write!(f, "job"),
            ArtifactKind::Output => write!(f, "output"),
        }
    }
}

/// Handle to something that exists on a provider's side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteArtifactRef {
    /// Provider name as configured
    pub provider: String,
    /// Provider-assigned identifier (may be an absolute URL for outputs)
    pub id: String,
    pub kind: ArtifactKind,
    pub created_at: DateTime<Utc>,
    /// Filename the provider reported, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl RemoteArtifactRef {
    pub fn new(provider: impl Into<String>, id: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            provider: provider.into(),
            id: id.into(),
            kind,
            created_at: Utc::now(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: Option<String>) -> Self {
        self.filename = filename;
        self
    }
}

/// Provider job id returned by submit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provider-specific job parameters plus any uploaded inputs.
///
/// Built by the caller-facing operation and never modified after submission.
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    pub params: serde_json::Map<String, serde_json::Value>,
    pub inputs: Vec<RemoteArtifactRef>,
    /// Passed by reference when the provider takes inputs by URL
    pub source_url: Option<String>,
}

/// One output entry as a provider reported it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub id: String,
    pub filename: Option<String>,
}

impl RawOutput {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filename: None,
        }
    }
}

/// A single status response before normalization
#[derive(Debug, Clone)]
pub struct RawStatus {
    pub status: String,
    pub outputs: Vec<RawOutput>,
    pub failure_reason: Option<String>,
    /// Full response body, surfaced to callers as metadata
    pub body: serde_json::Value,
}

impl RawStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            outputs: Vec::new(),
            failure_reason: None,
            body: serde_json::Value::Null,
        }
    }
}

/// Bytes of one fetched output with whatever naming hints the provider gave
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    pub bytes: Bytes,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
}

/// Outcome of the final poll of a job
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job: JobHandle,
    pub status: JobStatus,
    /// Only populated for `Succeeded`
    pub outputs: Vec<RemoteArtifactRef>,
    pub failure_reason: Option<String>,
    pub raw: serde_json::Value,
    pub waited: Duration,
}

impl JobResult {
    /// Turn a failed or cancelled terminal state into `JobFailed`
    pub fn require_success(self, provider: &str) -> ServiceResult<Self> {
        match self.status {
            JobStatus::Succeeded => Ok(self),
            JobStatus::Cancelled => Err(ServiceError::JobFailed {
                provider: provider.to_string(),
                job_id: self.job.to_string(),
                reason: self
                    .failure_reason
                    .unwrap_or_else(|| "job was cancelled by the provider".to_string()),
            }),
            _ => Err(ServiceError::JobFailed {
                provider: provider.to_string(),
                job_id: self.job.to_string(),
                reason: self
                    .failure_reason
                    .unwrap_or_else(|| "provider reported failure without a reason".to_string()),
            }),
        }
    }
}
