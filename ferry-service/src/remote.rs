//! Provider clients.
//!
//! [`RemoteStore`] is the submit/poll/fetch/delete surface the orchestration
//! code depends on. [`HttpRemoteStore`] implements it for JSON-over-HTTP
//! providers described by a [`ProviderConfig`](crate::config::ProviderConfig).

mod extract;
mod http;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceResult;
use crate::jobs::{
    FetchedArtifact, JobHandle, JobRequest, RawStatus, RemoteArtifactRef, StatusVocabulary,
};

pub use http::HttpRemoteStore;

/// One provider's job API.
///
/// Instances are shared read-only across concurrent operations and hold no
/// per-call state.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Configured provider name
    fn name(&self) -> &str;

    /// Raw status to [`JobStatus`](crate::jobs::JobStatus) mapping for this provider
    fn vocabulary(&self) -> &StatusVocabulary;

    /// Whether job inputs must be uploaded before submission
    fn accepts_uploads(&self) -> bool;

    /// Whether a job needs a source document at all
    fn requires_input(&self) -> bool;

    async fn upload_input(
        &self,
        filename: &str,
        bytes: Bytes,
        mime_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> ServiceResult<RemoteArtifactRef>;

    async fn submit(
        &self,
        request: &JobRequest,
        cancel: &CancellationToken,
    ) -> ServiceResult<JobHandle>;

    async fn poll(&self, job: &JobHandle, cancel: &CancellationToken) -> ServiceResult<RawStatus>;

    async fn fetch(
        &self,
        artifact: &RemoteArtifactRef,
        cancel: &CancellationToken,
    ) -> ServiceResult<FetchedArtifact>;

    /// Delete an input, job, or output.
    ///
    /// Takes no cancellation token so cleanup of a cancelled operation still
    /// completes. Kinds the provider cannot delete succeed as no-ops.
    async fn delete(&self, artifact: &RemoteArtifactRef) -> ServiceResult<()>;
}
