//! Durable destinations for materialized outputs.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::materialize::mime_for_filename;

/// A stored output the caller can fetch after remote artifacts are gone
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DurableLink {
    pub name: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Stores bytes somewhere durable.
///
/// `Ok(None)` means the destination accepted the call but produced no link;
/// callers treat that as a failed store.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn store(
        &self,
        filename: &str,
        bytes: Bytes,
        mime_type: Option<&str>,
    ) -> ServiceResult<Option<DurableLink>>;
}

/// Writes outputs under `<data_dir>/outputs/<uuid>/<name>`, served from `/files`
pub struct LocalUploader {
    root: PathBuf,
    public_base_url: String,
}

impl LocalUploader {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            root: storage.data_dir.join("outputs"),
            public_base_url: storage.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Read a previously stored file back, with its guessed content type
    pub async fn read(&self, dir: &str, name: &str) -> ServiceResult<(Bytes, String)> {
        let not_found = || ServiceError::FileNotFound {
            path: format!("{}/{}", dir, name),
        };

        // Only paths this uploader could have produced are served
        if Uuid::parse_str(dir).is_err() || sanitize_filename(name) != name {
            return Err(not_found());
        }

        let path = self.root.join(dir).join(name);
        let data = tokio::fs::read(&path).await.map_err(|_| not_found())?;
        let mime_type = mime_for_filename(name)
            .unwrap_or("application/octet-stream")
            .to_string();
        Ok((Bytes::from(data), mime_type))
    }
}

#[async_trait]
impl Uploader for LocalUploader {
    async fn store(
        &self,
        filename: &str,
        bytes: Bytes,
        mime_type: Option<&str>,
    ) -> ServiceResult<Option<DurableLink>> {
        let name = match sanitize_filename(filename) {
            name if name.is_empty() || name == "." || name == ".." => "output".to_string(),
            name => name,
        };
        let dir = Uuid::new_v4().to_string();
        let upload_error = |e: std::io::Error| ServiceError::Upload {
            filename: name.clone(),
            message: e.to_string(),
        };

        let target_dir = self.root.join(&dir);
        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(upload_error)?;
        let path = target_dir.join(&name);
        tokio::fs::write(&path, &bytes).await.map_err(upload_error)?;

        debug!(path = %path.display(), bytes = bytes.len(), "Stored output");
        info!(name = %name, dir = %dir, "Output stored locally");

        Ok(Some(DurableLink {
            uri: format!(
                "{}/files/{}/{}",
                self.public_base_url,
                dir,
                urlencoding::encode(&name)
            ),
            name,
            mime_type: mime_type.map(str::to_string),
        }))
    }
}

/// Sanitize a string for use as a filename
pub(crate) fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}
