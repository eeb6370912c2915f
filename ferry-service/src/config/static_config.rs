//! Static configuration that cannot be changed at runtime.
//! These settings affect server binding, storage, or provider wiring and require restart to change.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Static configuration that cannot be changed at runtime
#[derive(Debug, Clone, Deserialize)]
pub struct StaticConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_content")]
    pub content: ContentConfig,

    /// Remote job providers, keyed by the name callers use to address them
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Downstream reranker used by the rerank operation
    #[serde(default)]
    pub rerank: Option<RerankConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL under which stored outputs are reachable (durable links are built from it)
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

/// Source download configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_content_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Downloads larger than this are rejected
    #[serde(default = "default_max_download_bytes")]
    pub max_bytes: u64,
}

/// One remote job provider.
///
/// Every provider speaks the same submit/poll/fetch/delete shape over
/// different paths and field names; this struct captures those differences as data.
/// Path templates substitute `{id}` with the URL-encoded artifact or job id.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_auth_header")]
    pub auth_header: String,

    /// Prefix for the credential, e.g. "Bearer". Empty sends the raw key.
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,

    #[serde(default = "default_provider_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Multipart upload endpoint for job inputs. Providers without one take inputs by URL.
    #[serde(default)]
    pub upload_path: Option<String>,

    #[serde(default = "default_upload_field")]
    pub upload_field: String,

    #[serde(default = "default_id_pointer")]
    pub upload_id_pointer: String,

    pub submit_path: String,

    #[serde(default = "default_id_pointer")]
    pub job_id_pointer: String,

    pub status_path: String,

    #[serde(default = "default_status_pointer")]
    pub status_pointer: String,

    #[serde(default = "default_outputs_pointer")]
    pub outputs_pointer: String,

    /// Field holding the id when outputs are objects rather than plain strings
    #[serde(default = "default_output_id_field")]
    pub output_id_field: String,

    /// Tried in order; the first string found becomes the failure reason
    #[serde(default = "default_error_pointers")]
    pub error_pointers: Vec<String>,

    /// Output download endpoint. Outputs given as absolute URLs are fetched directly.
    #[serde(default)]
    pub fetch_path: Option<String>,

    #[serde(default)]
    pub delete_input_path: Option<String>,

    #[serde(default)]
    pub delete_job_path: Option<String>,

    #[serde(default)]
    pub delete_output_path: Option<String>,

    /// Request field that receives uploaded input ids (or the source URL when there is no upload path)
    #[serde(default = "default_input_field")]
    pub input_field: String,

    #[serde(default)]
    pub requires_input: bool,

    /// Extra raw statuses layered over the built-in vocabulary
    #[serde(default)]
    pub statuses: StatusOverrides,
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Provider-specific raw status strings, matched case-insensitively
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusOverrides {
    #[serde(default)]
    pub pending: Vec<String>,
    #[serde(default)]
    pub processing: Vec<String>,
    #[serde(default)]
    pub succeeded: Vec<String>,
    #[serde(default)]
    pub failed: Vec<String>,
    #[serde(default)]
    pub cancelled: Vec<String>,
}

/// Downstream rerank endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RerankConfig {
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_rerank_path")]
    pub path: String,

    pub model: String,

    #[serde(default = "default_provider_timeout_secs")]
    pub request_timeout_secs: u64,
}

// ==================== Default Value Functions ====================

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

pub(crate) fn default_storage() -> StorageConfig {
    StorageConfig {
        data_dir: default_data_dir(),
        public_base_url: default_public_base_url(),
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

pub(crate) fn default_content() -> ContentConfig {
    ContentConfig {
        timeout_secs: default_content_timeout_secs(),
        user_agent: default_user_agent(),
        max_bytes: default_max_download_bytes(),
    }
}

fn default_content_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("Ferry/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_download_bytes() -> u64 {
    104_857_600 // 100MB
}

fn default_auth_header() -> String {
    "Authorization".to_string()
}

fn default_auth_scheme() -> String {
    "Bearer".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    60
}

fn default_upload_field() -> String {
    "file".to_string()
}

fn default_id_pointer() -> String {
    "/id".to_string()
}

fn default_status_pointer() -> String {
    "/status".to_string()
}

fn default_outputs_pointer() -> String {
    "/outputs".to_string()
}

fn default_output_id_field() -> String {
    "id".to_string()
}

fn default_error_pointers() -> Vec<String> {
    vec![
        "/error/message".to_string(),
        "/error".to_string(),
        "/failure_reason".to_string(),
        "/message".to_string(),
    ]
}

fn default_input_field() -> String {
    "input".to_string()
}

fn default_rerank_path() -> String {
    "/v1/rerank".to_string()
}
