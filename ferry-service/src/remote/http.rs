//! JSON-over-HTTP provider client driven by [`ProviderConfig`].

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::RemoteStore;
use super::extract::{parse_status, require_id};
use crate::config::ProviderConfig;
use crate::content::{filename_from_disposition, filename_from_url, header_mime};
use crate::error::{ServiceError, ServiceResult};
use crate::jobs::{
    ArtifactKind, FetchedArtifact, JobHandle, JobRequest, RawStatus, RemoteArtifactRef,
    StatusVocabulary,
};

/// Provider client for one configured provider
pub struct HttpRemoteStore {
    name: String,
    client: Client,
    config: ProviderConfig,
    base_url: String,
    origin: Url,
    vocabulary: StatusVocabulary,
}

impl HttpRemoteStore {
    /// Create a new provider client
    pub fn new(name: impl Into<String>, config: ProviderConfig) -> ServiceResult<Self> {
        let name = name.into();
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(format!("Ferry/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to create HTTP client for provider {}: {}", name, e),
            })?;

        let origin = Url::parse(&config.base_url).map_err(|e| ServiceError::Config {
            message: format!("Invalid base_url for provider {}: {}", name, e),
        })?;

        Ok(Self {
            vocabulary: StatusVocabulary::with_overrides(&config.statuses),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            origin,
            name,
            client,
            config,
        })
    }

    fn url(&self, template: &str, id: Option<&str>) -> String {
        let path = match id {
            Some(id) => template.replace("{id}", &urlencoding::encode(id)),
            None => template.to_string(),
        };
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) if self.config.auth_scheme.is_empty() => {
                request.header(self.config.auth_header.as_str(), key.as_str())
            }
            Some(key) => request.header(
                self.config.auth_header.as_str(),
                format!("{} {}", self.config.auth_scheme, key),
            ),
            None => request,
        }
    }

    /// Send, honoring cancellation, and turn non-2xx into a provider error
    async fn send(
        &self,
        request: RequestBuilder,
        cancel: Option<&CancellationToken>,
    ) -> ServiceResult<Response> {
        let request = self.authorize(request);
        let sent = match cancel {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
                sent = request.send() => sent,
            },
            None => request.send().await,
        };
        let response = sent.map_err(|e| ServiceError::Transport {
            provider: self.name.clone(),
            source: e,
        })?;

        if !response.status().is_success() {
            return Err(ServiceError::Provider {
                provider: self.name.clone(),
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response)
    }

    async fn json(&self, response: Response) -> ServiceResult<serde_json::Value> {
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| ServiceError::Transport {
            provider: self.name.clone(),
            source: e,
        })?;
        serde_json::from_str(&text).map_err(|e| ServiceError::Provider {
            provider: self.name.clone(),
            status,
            body: format!("invalid JSON ({}): {}", e, text),
        })
    }

    fn delete_path(&self, kind: ArtifactKind) -> Option<&str> {
        match kind {
            ArtifactKind::Input => self.config.delete_input_path.as_deref(),
            ArtifactKind::Job => self.config.delete_job_path.as_deref(),
            ArtifactKind::Output => self.config.delete_output_path.as_deref(),
        }
    }

    fn is_absolute(id: &str) -> bool {
        id.starts_with("https://") || id.starts_with("http://")
    }

    /// Same scheme, host and port as the configured base URL
    fn is_own_origin(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|url| url.origin() == self.origin.origin())
    }

    /// Assemble the submit body: provider params plus input ids or source URL
    fn submit_body(&self, request: &JobRequest) -> serde_json::Value {
        let mut body = request.params.clone();
        let field = self.config.input_field.clone();
        match request.inputs.as_slice() {
            [] => {
                if let Some(url) = &request.source_url {
                    body.insert(field, serde_json::Value::String(url.clone()));
                }
            }
            [single] => {
                body.insert(field, serde_json::Value::String(single.id.clone()));
            }
            many => {
                body.insert(
                    field,
                    serde_json::Value::Array(
                        many.iter()
                            .map(|input| serde_json::Value::String(input.id.clone()))
                            .collect(),
                    ),
                );
            }
        }
        serde_json::Value::Object(body)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn vocabulary(&self) -> &StatusVocabulary {
        &self.vocabulary
    }

    fn accepts_uploads(&self) -> bool {
        self.config.upload_path.is_some()
    }

    fn requires_input(&self) -> bool {
        self.config.requires_input
    }

    async fn upload_input(
        &self,
        filename: &str,
        bytes: Bytes,
        mime_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> ServiceResult<RemoteArtifactRef> {
        let path = self
            .config
            .upload_path
            .as_deref()
            .ok_or_else(|| ServiceError::Config {
                message: format!("Provider {} has no upload_path", self.name),
            })?;

        let size = bytes.len();
        let mut part = Part::stream(bytes).file_name(filename.to_string());
        if let Some(mime) = mime_type {
            part = part.mime_str(mime).map_err(|e| {
                ServiceError::validation(format!("Invalid content type {}: {}", mime, e))
            })?;
        }
        let form = Form::new().part(self.config.upload_field.clone(), part);

        let response = self
            .send(
                self.client.post(self.url(path, None)).multipart(form),
                Some(cancel),
            )
            .await?;
        let body = self.json(response).await?;
        let id = require_id(&self.name, &body, &self.config.upload_id_pointer)?;

        info!(provider = %self.name, artifact_id = %id, filename = %filename, bytes = size, "Uploaded job input");
        Ok(
            RemoteArtifactRef::new(&self.name, id, ArtifactKind::Input)
                .with_filename(Some(filename.to_string())),
        )
    }

    async fn submit(
        &self,
        request: &JobRequest,
        cancel: &CancellationToken,
    ) -> ServiceResult<JobHandle> {
        let body = self.submit_body(request);
        let response = self
            .send(
                self.client
                    .post(self.url(&self.config.submit_path, None))
                    .json(&body),
                Some(cancel),
            )
            .await?;
        let body = self.json(response).await?;
        let id = require_id(&self.name, &body, &self.config.job_id_pointer)?;
        Ok(JobHandle::new(id))
    }

    async fn poll(&self, job: &JobHandle, cancel: &CancellationToken) -> ServiceResult<RawStatus> {
        let response = self
            .send(
                self.client
                    .get(self.url(&self.config.status_path, Some(job.as_str()))),
                Some(cancel),
            )
            .await?;
        let body = self.json(response).await?;
        parse_status(&self.name, &self.config, body)
    }

    async fn fetch(
        &self,
        artifact: &RemoteArtifactRef,
        cancel: &CancellationToken,
    ) -> ServiceResult<FetchedArtifact> {
        let request = if Self::is_absolute(&artifact.id) {
            // Signed download links carry their own credentials; only our own host gets the key
            if self.is_own_origin(&artifact.id) {
                self.client.get(&artifact.id)
            } else {
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
                    sent = self.client.get(&artifact.id).send() => sent,
                };
                let response = sent.map_err(|e| ServiceError::Transport {
                    provider: self.name.clone(),
                    source: e,
                })?;
                return self.read_artifact(artifact, response).await;
            }
        } else {
            let path = self
                .config
                .fetch_path
                .as_deref()
                .ok_or_else(|| ServiceError::Config {
                    message: format!(
                        "Provider {} returned output id {} but has no fetch_path",
                        self.name, artifact.id
                    ),
                })?;
            self.client.get(self.url(path, Some(&artifact.id)))
        };

        let response = self.send(request, Some(cancel)).await?;
        self.read_artifact(artifact, response).await
    }

    async fn delete(&self, artifact: &RemoteArtifactRef) -> ServiceResult<()> {
        let Some(path) = self.delete_path(artifact.kind) else {
            debug!(
                provider = %self.name,
                artifact_id = %artifact.id,
                kind = %artifact.kind,
                "Provider has no delete endpoint for this kind, skipping"
            );
            return Ok(());
        };

        match self
            .send(
                self.client.delete(self.url(path, Some(&artifact.id))),
                None,
            )
            .await
        {
            Ok(_) => Ok(()),
            // Already gone counts as deleted
            Err(ServiceError::Provider { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl HttpRemoteStore {
    async fn read_artifact(
        &self,
        artifact: &RemoteArtifactRef,
        response: Response,
    ) -> ServiceResult<FetchedArtifact> {
        if !response.status().is_success() {
            return Err(ServiceError::Provider {
                provider: self.name.clone(),
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let mime_type = header_mime(response.headers().get(CONTENT_TYPE));
        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .or_else(|| artifact.filename.clone())
            .or_else(|| {
                Self::is_absolute(&artifact.id)
                    .then(|| filename_from_url(&artifact.id))
                    .flatten()
            });

        let bytes = response.bytes().await.map_err(|e| ServiceError::Transport {
            provider: self.name.clone(),
            source: e,
        })?;

        debug!(
            provider = %self.name,
            artifact_id = %artifact.id,
            bytes = bytes.len(),
            "Fetched job output"
        );

        Ok(FetchedArtifact {
            bytes,
            filename,
            mime_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{http_response, loopback_server};
    use serde_json::json;

    fn store(overrides: serde_json::Value) -> HttpRemoteStore {
        let mut base = json!({
            "base_url": "https://api.example.com/",
            "api_key": "secret",
            "submit_path": "/v1/jobs",
            "status_path": "/v1/jobs/{id}",
            "input_field": "file_id",
        });
        if let (serde_json::Value::Object(base), serde_json::Value::Object(extra)) =
            (&mut base, overrides)
        {
            base.extend(extra);
        }
        HttpRemoteStore::new("docparse", serde_json::from_value(base).unwrap()).unwrap()
    }

    #[test]
    fn test_url_templates() {
        let store = store(json!({}));
        assert_eq!(
            store.url("/v1/jobs/{id}", Some("a b/c")),
            "https://api.example.com/v1/jobs/a%20b%2Fc"
        );
        assert_eq!(store.url("/v1/jobs", None), "https://api.example.com/v1/jobs");
    }

    #[test]
    fn test_submit_body_inputs() {
        let store = store(json!({}));
        let mut request = JobRequest::default();
        request
            .params
            .insert("model".to_string(), json!("layout-v2"));

        request.inputs = vec![RemoteArtifactRef::new(
            "docparse",
            "file-1",
            ArtifactKind::Input,
        )];
        assert_eq!(
            store.submit_body(&request),
            json!({ "model": "layout-v2", "file_id": "file-1" })
        );

        request
            .inputs
            .push(RemoteArtifactRef::new("docparse", "file-2", ArtifactKind::Input));
        assert_eq!(
            store.submit_body(&request)["file_id"],
            json!(["file-1", "file-2"])
        );

        request.inputs.clear();
        request.source_url = Some("https://example.com/a.pdf".to_string());
        assert_eq!(
            store.submit_body(&request)["file_id"],
            json!("https://example.com/a.pdf")
        );
    }

    #[test]
    fn test_capabilities_from_config() {
        let plain = store(json!({}));
        assert!(!plain.accepts_uploads());
        assert!(plain.delete_path(ArtifactKind::Job).is_none());

        let full = store(json!({
            "upload_path": "/v1/files",
            "delete_job_path": "/v1/jobs/{id}",
            "requires_input": true,
            "statuses": { "succeeded": ["GENERATED"] },
        }));
        assert!(full.accepts_uploads());
        assert!(full.requires_input());
        assert_eq!(full.delete_path(ArtifactKind::Job), Some("/v1/jobs/{id}"));
        assert_eq!(
            full.vocabulary().normalize("generated"),
            crate::jobs::JobStatus::Succeeded
        );
    }

    #[test]
    fn test_own_origin_matching() {
        let remote = store(json!({}));
        assert!(remote.is_own_origin("https://api.example.com/files/out.png"));
        assert!(remote.is_own_origin("https://api.example.com:443/files/out.png"));
        assert!(!remote.is_own_origin("https://api.example.com.evil.net/x"));
        assert!(!remote.is_own_origin("https://api.example.com@evil.net/x"));
        assert!(!remote.is_own_origin("http://api.example.com/files/out.png"));
        assert!(!remote.is_own_origin("https://api.example.com:8443/files/out.png"));
        assert!(!remote.is_own_origin("not a url"));

        let local = store(json!({ "base_url": "http://127.0.0.1:3708" }));
        assert!(local.is_own_origin("http://127.0.0.1:3708/out.png"));
        assert!(!local.is_own_origin("http://127.0.0.1:37081/out.png"));
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let config = serde_json::from_value(json!({
            "base_url": "api.example.com",
            "submit_path": "/v1/jobs",
            "status_path": "/v1/jobs/{id}",
        }))
        .unwrap();
        assert!(matches!(
            HttpRemoteStore::new("docparse", config),
            Err(ServiceError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_not_found_counts_as_deleted() {
        let (base, server) =
            loopback_server(vec![http_response("404 Not Found", &[], "no such job")]).await;
        let remote = store(json!({ "base_url": base, "delete_job_path": "/v1/jobs/{id}" }));

        remote
            .delete(&RemoteArtifactRef::new("docparse", "job-9", ArtifactKind::Job))
            .await
            .unwrap();

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("DELETE /v1/jobs/job-9 "));
    }

    #[tokio::test]
    async fn test_delete_server_error_surfaces() {
        let (base, server) =
            loopback_server(vec![http_response("500 Internal Server Error", &[], "boom")]).await;
        let remote = store(json!({ "base_url": base, "delete_input_path": "/v1/files/{id}" }));

        let err = remote
            .delete(&RemoteArtifactRef::new("docparse", "file-1", ArtifactKind::Input))
            .await
            .unwrap_err();
        server.await.unwrap();

        match err {
            ServiceError::Provider { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_without_path_skips_request() {
        let (base, server) = loopback_server(Vec::new()).await;
        let remote = store(json!({ "base_url": base }));

        remote
            .delete(&RemoteArtifactRef::new("docparse", "job-1", ArtifactKind::Job))
            .await
            .unwrap();
        assert!(server.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poll_error_status_carries_body() {
        let (base, server) =
            loopback_server(vec![http_response("503 Service Unavailable", &[], "overloaded")])
                .await;
        let remote = store(json!({ "base_url": base }));

        let err = remote
            .poll(&JobHandle::new("job-1"), &CancellationToken::new())
            .await
            .unwrap_err();
        let requests = server.await.unwrap();

        match err {
            ServiceError::Provider { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected provider error, got {other:?}"),
        }
        assert!(requests[0].starts_with("GET /v1/jobs/job-1 "));
    }

    #[tokio::test]
    async fn test_poll_invalid_json_is_provider_error() {
        let (base, server) = loopback_server(vec![http_response(
            "200 OK",
            &[("Content-Type", "application/json")],
            "<html>gateway</html>",
        )])
        .await;
        let remote = store(json!({ "base_url": base }));

        let err = remote
            .poll(&JobHandle::new("job-1"), &CancellationToken::new())
            .await
            .unwrap_err();
        server.await.unwrap();

        match err {
            ServiceError::Provider { status, body, .. } => {
                assert_eq!(status, 200);
                assert!(body.starts_with("invalid JSON"), "{body}");
                assert!(body.ends_with("<html>gateway</html>"));
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_poll_parses_status() {
        let (base, server) = loopback_server(vec![http_response(
            "200 OK",
            &[("Content-Type", "application/json")],
            r#"{"status":"processing"}"#,
        )])
        .await;
        let remote = store(json!({ "base_url": base }));

        let raw = remote
            .poll(&JobHandle::new("job-1"), &CancellationToken::new())
            .await
            .unwrap();
        let requests = server.await.unwrap();

        assert_eq!(raw.status, "processing");
        assert!(
            requests[0]
                .to_ascii_lowercase()
                .contains("authorization: bearer secret")
        );
    }

    #[tokio::test]
    async fn test_fetch_own_origin_sends_key() {
        let (base, server) = loopback_server(vec![http_response(
            "200 OK",
            &[("Content-Type", "image/png")],
            "png-bytes",
        )])
        .await;
        let remote = store(json!({ "base_url": base.clone() }));
        let artifact = RemoteArtifactRef::new(
            "docparse",
            format!("{}/files/out.png", base),
            ArtifactKind::Output,
        );

        let fetched = remote
            .fetch(&artifact, &CancellationToken::new())
            .await
            .unwrap();
        let requests = server.await.unwrap();

        assert_eq!(fetched.bytes, Bytes::from_static(b"png-bytes"));
        assert_eq!(fetched.filename.as_deref(), Some("out.png"));
        assert!(
            requests[0]
                .to_ascii_lowercase()
                .contains("authorization: bearer secret")
        );
    }

    #[tokio::test]
    async fn test_fetch_other_origin_omits_key() {
        // Same host, different port: a distinct origin
        let (provider_base, provider) = loopback_server(Vec::new()).await;
        let (cdn_base, cdn) = loopback_server(vec![http_response(
            "200 OK",
            &[("Content-Type", "image/png")],
            "png-bytes",
        )])
        .await;
        let remote = store(json!({ "base_url": provider_base }));
        let artifact = RemoteArtifactRef::new(
            "docparse",
            format!("{}/out.png", cdn_base),
            ArtifactKind::Output,
        );

        let fetched = remote
            .fetch(&artifact, &CancellationToken::new())
            .await
            .unwrap();
        let requests = cdn.await.unwrap();

        assert_eq!(fetched.bytes, Bytes::from_static(b"png-bytes"));
        assert_eq!(fetched.mime_type.as_deref(), Some("image/png"));
        assert!(!requests[0].to_ascii_lowercase().contains("authorization:"));
        assert!(provider.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_relative_id_uses_fetch_path() {
        let (base, server) = loopback_server(vec![http_response(
            "200 OK",
            &[
                ("Content-Type", "application/pdf"),
                ("Content-Disposition", "attachment; filename=\"result.pdf\""),
            ],
            "%PDF-1.7",
        )])
        .await;
        let remote = store(json!({ "base_url": base, "fetch_path": "/v1/files/{id}/content" }));
        let artifact = RemoteArtifactRef::new("docparse", "out-1", ArtifactKind::Output);

        let fetched = remote
            .fetch(&artifact, &CancellationToken::new())
            .await
            .unwrap();
        let requests = server.await.unwrap();

        assert_eq!(fetched.filename.as_deref(), Some("result.pdf"));
        assert!(requests[0].starts_with("GET /v1/files/out-1/content "));
    }
}
