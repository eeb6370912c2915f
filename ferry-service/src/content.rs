//! Source download collaborator.
//!
//! Resolves a URL into one or more payloads. A plain download yields a single
//! payload; an HTML page additionally yields the page text as a `text/plain`
//! part so callers that only want text can skip markup.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::Client;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ContentConfig;
use crate::error::{ServiceError, ServiceResult};

/// One payload produced from a source reference
#[derive(Debug, Clone)]
pub struct ResolvedContent {
    pub bytes: Bytes,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub uri: String,
}

impl ResolvedContent {
    /// Whether this payload is text a downstream model can read directly
    pub fn is_text(&self) -> bool {
        match self.mime_type.as_deref() {
            Some(mime) => is_text_mime(mime),
            None => std::str::from_utf8(&self.bytes).is_ok(),
        }
    }

    /// Non-blank text of a text-bearing payload
    pub fn text(&self) -> Option<String> {
        if !self.is_text() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.bytes);
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

fn is_text_mime(mime: &str) -> bool {
    let Ok(parsed) = mime.parse::<mime::Mime>() else {
        return false;
    };
    // Markup is represented by its extracted text part instead
    if is_markup(&parsed) {
        return false;
    }
    if parsed.suffix() == Some(mime::JSON) || parsed.suffix() == Some(mime::XML) {
        return true;
    }
    let (top, sub) = (parsed.type_(), parsed.subtype());
    if top == mime::TEXT {
        return true;
    }
    top == mime::APPLICATION
        && (sub == mime::JSON
            || sub == mime::XML
            || matches!(sub.as_str(), "markdown" | "yaml" | "x-yaml"))
}

/// HTML pages, including XHTML served as `application/xhtml+xml`
fn is_markup(mime: &mime::Mime) -> bool {
    match (mime.type_(), mime.subtype()) {
        (mime::TEXT, mime::HTML) => true,
        (mime::APPLICATION, sub) => sub.as_str() == "xhtml",
        _ => false,
    }
}

/// Turns a source reference into payloads
#[async_trait]
pub trait ContentResolver: Send + Sync {
    async fn resolve(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> ServiceResult<Vec<ResolvedContent>>;
}

/// Downloads sources over HTTP(S)
pub struct HttpContentResolver {
    client: Client,
    max_bytes: u64,
}

impl HttpContentResolver {
    pub fn new(config: &ContentConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to create download client: {}", e),
            })?;

        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    async fn download(&self, url: &str) -> ServiceResult<ResolvedContent> {
        let download_error = |message: String| ServiceError::Download {
            url: url.to_string(),
            message,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_error(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(download_error(format!("status {}: {}", status, body)));
        }

        if let Some(length) = response
            .content_length()
            .filter(|length| *length > self.max_bytes)
        {
            return Err(download_error(format!(
                "{} bytes exceeds limit of {} bytes",
                length, self.max_bytes
            )));
        }

        let mime_type = header_mime(response.headers().get(CONTENT_TYPE));
        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .or_else(|| filename_from_url(url));

        let mut buffer = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| download_error(e.to_string()))?
        {
            if (buffer.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(download_error(format!(
                    "body exceeds limit of {} bytes",
                    self.max_bytes
                )));
            }
            buffer.extend_from_slice(&chunk);
        }

        debug!(url = %url, bytes = buffer.len(), mime = ?mime_type, "Downloaded source");

        Ok(ResolvedContent {
            bytes: buffer.freeze(),
            filename,
            mime_type,
            uri: url.to_string(),
        })
    }
}

#[async_trait]
impl ContentResolver for HttpContentResolver {
    async fn resolve(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> ServiceResult<Vec<ResolvedContent>> {
        validate_source_url(url)?;

        let content = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
            content = self.download(url) => content?,
        };

        let is_html = content
            .mime_type
            .as_deref()
            .and_then(|m| m.parse::<mime::Mime>().ok())
            .is_some_and(|m| is_markup(&m));
        if !is_html {
            return Ok(vec![content]);
        }

        let text = html_to_text(&String::from_utf8_lossy(&content.bytes));
        let text_part = ResolvedContent {
            bytes: Bytes::from(text),
            filename: content
                .filename
                .as_deref()
                .map(|name| format!("{}.txt", file_stem(name))),
            mime_type: Some("text/plain".to_string()),
            uri: content.uri.clone(),
        };
        Ok(vec![content, text_part])
    }
}

/// Reject anything that is not an absolute http(s) URL
pub fn validate_source_url(url: &str) -> ServiceResult<()> {
    let lower = url.trim().to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(())
    } else {
        Err(ServiceError::validation(format!(
            "Source must be an http(s) URL: {}",
            url
        )))
    }
}

/// Essence of a Content-Type header ("text/plain; charset=utf-8" -> "text/plain")
pub(crate) fn header_mime(value: Option<&reqwest::header::HeaderValue>) -> Option<String> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

pub(crate) fn filename_from_disposition(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|part| {
        let name = part.strip_prefix("filename=")?;
        let name = name.trim_matches('"').trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}

pub(crate) fn filename_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let without_scheme = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);
    // Bare host has no filename
    let (_, path) = without_scheme.split_once('/')?;
    let segment = path.rsplit('/').next()?;
    if segment.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    Some(decoded)
}

pub(crate) fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Crude markup stripper: drops script/style bodies and tags, collapses whitespace
fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len() / 2);
    let lower = html.to_ascii_lowercase();
    let mut i = 0;

    while i < html.len() {
        let rest = &lower[i..];
        if rest.starts_with("<script") || rest.starts_with("<style") {
            let closing = if rest.starts_with("<script") {
                "</script>"
            } else {
                "</style>"
            };
            i = match rest.find(closing) {
                Some(end) => i + end + closing.len(),
                None => html.len(),
            };
            text.push(' ');
            continue;
        }
        if rest.starts_with('<') {
            i = match rest.find('>') {
                Some(end) => i + end + 1,
                None => html.len(),
            };
            text.push(' ');
            continue;
        }
        let next = rest.find('<').map(|n| i + n).unwrap_or(html.len());
        text.push_str(&html[i..next]);
        i = next;
    }

    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
