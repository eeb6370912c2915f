//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::content::{ContentResolver, ResolvedContent};
use crate::destination::{DurableLink, Uploader};
use crate::error::{ServiceError, ServiceResult};
use crate::jobs::{
    ArtifactKind, FetchedArtifact, JobHandle, JobRequest, RawOutput, RawStatus,
    RemoteArtifactRef, StatusVocabulary,
};
use crate::remote::RemoteStore;

/// Scripted provider that records every call it receives
pub struct FakeStore {
    name: String,
    vocabulary: StatusVocabulary,
    job_id: String,
    statuses: Mutex<VecDeque<RawStatus>>,
    failing_fetch: HashSet<String>,
    failing_delete: HashSet<String>,
    submit_fails: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            vocabulary: StatusVocabulary::default(),
            job_id: "job-1".to_string(),
            statuses: Mutex::default(),
            failing_fetch: HashSet::new(),
            failing_delete: HashSet::new(),
            submit_fails: false,
            calls: Mutex::default(),
        }
    }

    /// Queue a status response; the last one repeats once the queue drains
    pub fn status(self, status: &str, outputs: &[&str], reason: Option<&str>) -> Self {
        let mut raw = RawStatus::new(status);
        raw.outputs = outputs.iter().map(|id| RawOutput::new(*id)).collect();
        raw.failure_reason = reason.map(str::to_string);
        raw.body = serde_json::json!({ "status": status });
        self.statuses.lock().unwrap().push_back(raw);
        self
    }

    pub fn failing_fetch(mut self, id: &str) -> Self {
        self.failing_fetch.insert(id.to_string());
        self
    }

    pub fn failing_delete(mut self, id: &str) -> Self {
        self.failing_delete.insert(id.to_string());
        self
    }

    pub fn failing_submit(mut self) -> Self {
        self.submit_fails = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Delete calls as "kind:id", in the order they happened
    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| call.strip_prefix("delete:").map(str::to_string))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn provider_error(&self, body: &str) -> ServiceError {
        ServiceError::Provider {
            provider: self.name.clone(),
            status: 500,
            body: body.to_string(),
        }
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn vocabulary(&self) -> &StatusVocabulary {
        &self.vocabulary
    }

    fn accepts_uploads(&self) -> bool {
        true
    }

    fn requires_input(&self) -> bool {
        false
    }

    async fn upload_input(
        &self,
        filename: &str,
        _bytes: Bytes,
        _mime_type: Option<&str>,
        _cancel: &CancellationToken,
    ) -> ServiceResult<RemoteArtifactRef> {
        self.record(format!("upload:{}", filename));
        Ok(RemoteArtifactRef::new(&self.name, "input-1", ArtifactKind::Input))
    }

    async fn submit(
        &self,
        _request: &JobRequest,
        _cancel: &CancellationToken,
    ) -> ServiceResult<JobHandle> {
        self.record("submit".to_string());
        if self.submit_fails {
            return Err(self.provider_error("submit rejected"));
        }
        Ok(JobHandle::new(self.job_id.clone()))
    }

    async fn poll(&self, job: &JobHandle, _cancel: &CancellationToken) -> ServiceResult<RawStatus> {
        self.record(format!("poll:{}", job));
        let mut statuses = self.statuses.lock().unwrap();
        let next = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        next.ok_or_else(|| self.provider_error("no scripted status"))
    }

    async fn fetch(
        &self,
        artifact: &RemoteArtifactRef,
        _cancel: &CancellationToken,
    ) -> ServiceResult<FetchedArtifact> {
        self.record(format!("fetch:{}", artifact.id));
        if self.failing_fetch.contains(&artifact.id) {
            return Err(self.provider_error("fetch failed"));
        }
        Ok(FetchedArtifact {
            bytes: Bytes::from(artifact.id.clone()),
            filename: None,
            mime_type: Some("image/png".to_string()),
        })
    }

    async fn delete(&self, artifact: &RemoteArtifactRef) -> ServiceResult<()> {
        self.record(format!("delete:{}:{}", artifact.kind, artifact.id));
        if self.failing_delete.contains(&artifact.id) {
            return Err(self.provider_error("delete failed"));
        }
        Ok(())
    }
}

/// Destination that keeps stored names in memory
#[derive(Default)]
pub struct FakeUploader {
    stored: Mutex<Vec<String>>,
    return_none: bool,
}

impl FakeUploader {
    pub fn returning_none() -> Self {
        Self {
            return_none: true,
            ..Self::default()
        }
    }

    pub fn stored(&self) -> Vec<String> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn store(
        &self,
        filename: &str,
        _bytes: Bytes,
        mime_type: Option<&str>,
    ) -> ServiceResult<Option<DurableLink>> {
        if self.return_none {
            return Ok(None);
        }
        self.stored.lock().unwrap().push(filename.to_string());
        Ok(Some(DurableLink {
            name: filename.to_string(),
            uri: format!("mem://{}", filename),
            mime_type: mime_type.map(str::to_string),
        }))
    }
}

/// Resolver answering from a fixed table; unknown URLs fail
#[derive(Default)]
pub struct FakeResolver {
    texts: HashMap<String, Vec<&'static str>>,
}

impl FakeResolver {
    pub fn with(mut self, url: &str, texts: &[&'static str]) -> Self {
        self.texts.insert(url.to_string(), texts.to_vec());
        self
    }
}

#[async_trait]
impl ContentResolver for FakeResolver {
    async fn resolve(
        &self,
        url: &str,
        _cancel: &CancellationToken,
    ) -> ServiceResult<Vec<ResolvedContent>> {
        let texts = self.texts.get(url).ok_or_else(|| ServiceError::Download {
            url: url.to_string(),
            message: "status 404: not found".to_string(),
        })?;
        Ok(texts
            .iter()
            .map(|text| ResolvedContent {
                bytes: Bytes::from_static(text.as_bytes()),
                filename: None,
                mime_type: Some("text/plain".to_string()),
                uri: url.to_string(),
            })
            .collect())
    }
}

/// Serve canned HTTP responses on a loopback port, one connection per response.
///
/// Returns the base URL and a task resolving to the raw requests received, in order.
pub async fn loopback_server(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let mut requests = Vec::new();
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);
            // The client may hang up early once it has seen enough
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
        requests
    });

    (base, server)
}

/// A complete HTTP/1.1 response that closes the connection
pub fn http_response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut response = format!("HTTP/1.1 {}\r\n", status);
    for (name, value) in headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    ));
    response
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let read = socket.read(&mut chunk).await.unwrap_or(0);
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);

        let Some(head_end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buffer[..head_end]).to_ascii_lowercase();
        let body_len = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buffer.len() >= head_end + 4 + body_len {
            break;
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
