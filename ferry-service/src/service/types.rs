//! Request and response shapes for the caller-facing operations.

use serde::{Deserialize, Serialize};

use crate::destination::DurableLink;
use crate::fanout::FanOutItem;
use crate::jobs::JobStatus;

fn default_wait() -> bool {
    true
}

/// Run one job on a provider
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOperationRequest {
    pub provider: String,

    /// Provider-specific job parameters, passed through to submit
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub source_url: Option<String>,

    #[serde(default)]
    pub polling_interval_seconds: Option<u64>,

    #[serde(default)]
    pub max_wait_seconds: Option<u64>,

    /// Base name for stored outputs
    #[serde(default)]
    pub output_filename: Option<String>,

    /// `false` returns right after submission with a pending task id
    #[serde(default = "default_wait")]
    pub wait: bool,

    #[serde(default)]
    pub operation_id: Option<String>,
}

impl JobOperationRequest {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            params: serde_json::Map::new(),
            source_url: None,
            polling_interval_seconds: None,
            max_wait_seconds: None,
            output_filename: None,
            wait: true,
            operation_id: None,
        }
    }
}

/// Result of a job operation
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JobOperationResponse {
    Completed(CompletedJob),
    Pending(PendingJob),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedJob {
    pub operation_id: String,
    pub provider: String,
    pub task_id: String,
    pub status: JobStatus,
    pub outputs: Vec<DurableLink>,
    /// Final provider status body
    pub metadata: serde_json::Value,
    pub waited_seconds: f64,
}

/// Returned when the caller opted out of waiting
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingJob {
    pub task_id: String,
    pub status: JobStatus,
    pub provider: String,
    pub operation_id: String,
}

/// Query for a previously submitted task
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQuery {
    /// Fetch and store outputs if the task has succeeded
    #[serde(default)]
    pub materialize: bool,

    #[serde(default, alias = "output_filename")]
    pub output_filename: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusResponse {
    pub provider: String,
    pub task_id: String,
    pub status: JobStatus,
    pub raw_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Populated only when materialization was requested and the task succeeded
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<DurableLink>,
    pub metadata: serde_json::Value,
}

/// Rank many sources against one query
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankSourcesRequest {
    pub query: String,
    pub sources: Vec<String>,
    #[serde(default, alias = "top_n")]
    pub top_n: Option<usize>,
    #[serde(default)]
    pub operation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedSource {
    pub source_ref: String,
    pub relevance_score: f64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankSourcesResponse {
    pub operation_id: String,
    pub query: String,
    pub results: Vec<RankedSource>,
    /// Sources that produced no text or failed to download
    pub skipped: Vec<FanOutItem>,
}

/// Current dynamic settings
#[derive(Debug, Clone, Serialize)]
pub struct SettingsResponse {
    pub settings: std::collections::HashMap<String, serde_json::Value>,
    /// Keys whose value differs from the built-in default
    pub overridden: Vec<String>,
}
