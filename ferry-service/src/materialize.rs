//! Turns a finished job's remote outputs into durable links.
//!
//! Outputs are fetched and stored one at a time, in the order the provider
//! listed them, so the returned links line up with `JobResult::outputs`.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::MaterializeConfig;
use crate::destination::{DurableLink, Uploader};
use crate::error::{ServiceError, ServiceResult};
use crate::jobs::{FetchedArtifact, RemoteArtifactRef};
use crate::remote::RemoteStore;

/// Known extension and content type pairs; the first entry for a type wins
const MIME_TABLE: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("tiff", "image/tiff"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("m4a", "audio/mp4"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("html", "text/html"),
    ("csv", "text/csv"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("zip", "application/zip"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
];

/// What to do when one output cannot be fetched or stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializePolicy {
    /// First failure aborts the whole materialization
    Strict,
    /// Failed outputs are logged and skipped; fails only if nothing was stored
    BestEffort,
}

impl MaterializePolicy {
    pub fn from_config(config: &MaterializeConfig) -> Self {
        if config.strict {
            MaterializePolicy::Strict
        } else {
            MaterializePolicy::BestEffort
        }
    }
}

/// How stored outputs are named
#[derive(Debug, Clone)]
pub struct OutputNaming {
    /// Caller-chosen base name; falls back to the provider's filename
    pub base_name: Option<String>,
    pub default_extension: String,
}

impl OutputNaming {
    pub fn new(base_name: Option<String>, config: &MaterializeConfig) -> Self {
        Self {
            base_name: base_name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
            default_extension: config.default_extension.clone(),
        }
    }

    /// Destination filename for output `index` (zero-based) of `total`.
    ///
    /// A single output is `base.ext`; several are `base-1.ext`, `base-2.ext`, ...
    /// The extension comes from the provider's filename, then the content type,
    /// then the caller's base name, then the configured default.
    pub fn filename(
        &self,
        index: usize,
        total: usize,
        source_filename: Option<&str>,
        mime_type: Option<&str>,
    ) -> String {
        let (base_stem, base_ext) = match &self.base_name {
            Some(base) => split_extension(base),
            None => (
                source_filename
                    .map(|name| split_extension(name).0)
                    .filter(|stem| !stem.is_empty())
                    .unwrap_or("output"),
                None,
            ),
        };

        let extension = source_filename
            .and_then(|name| split_extension(name).1)
            .or_else(|| mime_type.and_then(extension_for_mime))
            .or(base_ext)
            .unwrap_or(self.default_extension.as_str())
            .to_ascii_lowercase();

        if total > 1 {
            format!("{}-{}.{}", base_stem, index + 1, extension)
        } else {
            format!("{}.{}", base_stem, extension)
        }
    }
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=8).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            (stem, Some(ext))
        }
        _ => (name.trim_end_matches('.'), None),
    }
}

pub(crate) fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let essence = mime_type.split(';').next()?.trim();
    MIME_TABLE
        .iter()
        .find(|(_, mime)| mime.eq_ignore_ascii_case(essence))
        .map(|(ext, _)| *ext)
}

pub(crate) fn mime_for_filename(name: &str) -> Option<&'static str> {
    let ext = split_extension(name).1?;
    MIME_TABLE
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
}

/// Fetch every output from `store` and persist it through `uploader`.
///
/// Cancellation is checked before each fetch and store. Remote outputs are
/// not deleted here; callers track them on their lifecycle scope.
pub async fn materialize(
    outputs: &[RemoteArtifactRef],
    store: &dyn RemoteStore,
    uploader: &dyn Uploader,
    naming: &OutputNaming,
    policy: MaterializePolicy,
    cancel: &CancellationToken,
) -> ServiceResult<Vec<DurableLink>> {
    let total = outputs.len();
    let mut links = Vec::with_capacity(total);
    let mut first_error = None;

    for (index, output) in outputs.iter().enumerate() {
        match materialize_one(output, index, total, store, uploader, naming, cancel).await {
            Ok(link) => links.push(link),
            Err(ServiceError::Cancelled) => return Err(ServiceError::Cancelled),
            Err(e) if policy == MaterializePolicy::Strict => return Err(e),
            Err(e) => {
                warn!(
                    provider = %output.provider,
                    artifact_id = %output.id,
                    error = %e,
                    "Skipping output that could not be materialized"
                );
                first_error.get_or_insert(e);
            }
        }
    }

    if links.is_empty() {
        if let Some(e) = first_error {
            return Err(e);
        }
    }

    info!(stored = links.len(), total, "Materialized job outputs");
    Ok(links)
}

async fn materialize_one(
    output: &RemoteArtifactRef,
    index: usize,
    total: usize,
    store: &dyn RemoteStore,
    uploader: &dyn Uploader,
    naming: &OutputNaming,
    cancel: &CancellationToken,
) -> ServiceResult<DurableLink> {
    if cancel.is_cancelled() {
        return Err(ServiceError::Cancelled);
    }

    let FetchedArtifact {
        bytes,
        filename,
        mime_type,
    } = store.fetch(output, cancel).await?;

    let source_filename = filename.or_else(|| output.filename.clone());
    let name = naming.filename(index, total, source_filename.as_deref(), mime_type.as_deref());
    let mime_type = mime_type.or_else(|| mime_for_filename(&name).map(str::to_string));

    let stored = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
        stored = uploader.store(&name, bytes, mime_type.as_deref()) => stored?,
    };

    stored.ok_or_else(|| ServiceError::Upload {
        filename: name,
        message: "destination returned no link".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::ArtifactKind;
    use crate::testing::{FakeStore, FakeUploader};

    fn naming(base: Option<&str>) -> OutputNaming {
        OutputNaming {
            base_name: base.map(str::to_string),
            default_extension: "bin".to_string(),
        }
    }

    fn outputs(ids: &[&str]) -> Vec<RemoteArtifactRef> {
        ids.iter()
            .map(|id| RemoteArtifactRef::new("fake", *id, ArtifactKind::Output))
            .collect()
    }

    #[test]
    fn test_output_filenames() {
        let named = naming(Some("report"));
        assert_eq!(named.filename(0, 1, Some("x.PDF"), None), "report.pdf");
        assert_eq!(named.filename(0, 2, None, Some("image/png")), "report-1.png");
        assert_eq!(named.filename(1, 2, None, Some("image/png")), "report-2.png");
        assert_eq!(named.filename(0, 1, None, None), "report.bin");

        let with_ext = naming(Some("summary.md"));
        assert_eq!(with_ext.filename(0, 1, None, None), "summary.md");
        assert_eq!(with_ext.filename(0, 1, None, Some("text/plain")), "summary.txt");

        let unnamed = naming(None);
        assert_eq!(unnamed.filename(0, 1, Some("scan.tiff"), None), "scan.tiff");
        assert_eq!(
            unnamed.filename(0, 1, None, Some("video/mp4; codecs=avc1")),
            "output.mp4"
        );
    }

    #[test]
    fn test_mime_lookup() {
        assert_eq!(mime_for_filename("a.JPG"), Some("image/jpeg"));
        assert_eq!(extension_for_mime("image/jpeg"), Some("jpg"));
        assert_eq!(mime_for_filename("README"), None);
    }

    #[tokio::test]
    async fn test_strict_stops_at_first_failure() {
        let store = FakeStore::new("fake").failing_fetch("b");
        let uploader = FakeUploader::default();
        let cancel = CancellationToken::new();

        let result = materialize(
            &outputs(&["a", "b", "c"]),
            &store,
            &uploader,
            &naming(Some("out")),
            MaterializePolicy::Strict,
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(ServiceError::Provider { .. })));
        assert_eq!(uploader.stored(), vec!["out-1.png"]);
    }

    #[tokio::test]
    async fn test_best_effort_skips_failures() {
        let store = FakeStore::new("fake").failing_fetch("b");
        let uploader = FakeUploader::default();
        let cancel = CancellationToken::new();

        let links = materialize(
            &outputs(&["a", "b", "c"]),
            &store,
            &uploader,
            &naming(Some("out")),
            MaterializePolicy::BestEffort,
            &cancel,
        )
        .await
        .unwrap();

        let names: Vec<_> = links.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["out-1.png", "out-3.png"]);
    }

    #[tokio::test]
    async fn test_missing_link_is_upload_error() {
        let store = FakeStore::new("fake");
        let uploader = FakeUploader::returning_none();
        let cancel = CancellationToken::new();

        let result = materialize(
            &outputs(&["a"]),
            &store,
            &uploader,
            &naming(None),
            MaterializePolicy::BestEffort,
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(ServiceError::Upload { .. })));
    }
}
