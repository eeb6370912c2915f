//! Bounded fan-out over many source references.
//!
//! Each source is resolved on its own task behind a semaphore local to the
//! call. Results are joined by their scheduling index, so the returned order
//! never depends on which download finished first.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::content::ContentResolver;
use crate::error::{ServiceError, ServiceResult};

/// Outcome of resolving one source reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutItem {
    pub source_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FanOutItem {
    fn has_text(&self) -> bool {
        self.extracted_text.is_some()
    }
}

/// Merged fan-out result
#[derive(Debug, Clone)]
pub struct Aggregated {
    /// Items with text, in input order
    pub items: Vec<FanOutItem>,
    /// Items that failed or produced no text, in input order
    pub skipped: Vec<FanOutItem>,
}

/// Resolve every item, at most `concurrency` at a time, and return one entry
/// per item in input order. Failures are recorded on the entry, not returned.
pub async fn gather(
    items: &[String],
    concurrency: usize,
    resolver: Arc<dyn ContentResolver>,
    cancel: &CancellationToken,
) -> ServiceResult<Vec<FanOutItem>> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut join_set = JoinSet::new();

    for (index, source) in items.iter().cloned().enumerate() {
        let semaphore = semaphore.clone();
        let resolver = resolver.clone();
        let cancel = cancel.clone();
        join_set.spawn(async move {
            let item = resolve_item(source, &semaphore, resolver.as_ref(), &cancel).await;
            (index, item)
        });
    }

    let mut slots: Vec<Option<FanOutItem>> = vec![None; items.len()];
    loop {
        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                join_set.abort_all();
                return Err(ServiceError::Cancelled);
            }
            joined = join_set.join_next() => joined,
        };

        match joined {
            Some(Ok((index, item))) => slots[index] = Some(item),
            Some(Err(e)) => warn!(error = %e, "Fan-out worker did not finish"),
            None => break,
        }
    }

    Ok(slots
        .into_iter()
        .zip(items)
        .map(|(slot, source)| {
            slot.unwrap_or_else(|| FanOutItem {
                source_ref: source.clone(),
                extracted_text: None,
                error: Some("worker did not finish".to_string()),
            })
        })
        .collect())
}

async fn resolve_item(
    source: String,
    semaphore: &Semaphore,
    resolver: &dyn ContentResolver,
    cancel: &CancellationToken,
) -> FanOutItem {
    // The semaphore is never closed, so this only errors in theory
    let _permit = match semaphore.acquire().await {
        Ok(permit) => permit,
        Err(e) => {
            return FanOutItem {
                source_ref: source,
                extracted_text: None,
                error: Some(e.to_string()),
            };
        }
    };

    match resolver.resolve(&source, cancel).await {
        Ok(parts) => {
            let texts: Vec<String> = parts.iter().filter_map(|part| part.text()).collect();
            debug!(source = %source, parts = parts.len(), texts = texts.len(), "Resolved source");
            FanOutItem {
                source_ref: source,
                extracted_text: (!texts.is_empty()).then(|| texts.join("\n\n")),
                error: None,
            }
        }
        Err(e) => {
            warn!(source = %source, error = %e, "Skipping source that could not be resolved");
            FanOutItem {
                source_ref: source,
                extracted_text: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Resolve every item and keep only those that produced text, in input order.
///
/// Fails with [`ServiceError::NoContent`] when no item yields any text.
pub async fn aggregate(
    items: &[String],
    concurrency: usize,
    resolver: Arc<dyn ContentResolver>,
    cancel: &CancellationToken,
) -> ServiceResult<Aggregated> {
    let gathered = gather(items, concurrency, resolver, cancel).await?;
    let (with_text, without): (Vec<_>, Vec<_>) =
        gathered.into_iter().partition(FanOutItem::has_text);

    metrics::counter!("ferry_fanout_items_total", "outcome" => "text")
        .increment(with_text.len() as u64);
    metrics::counter!("ferry_fanout_items_total", "outcome" => "skipped")
        .increment(without.len() as u64);
    info!(
        sources = items.len(),
        with_text = with_text.len(),
        skipped = without.len(),
        "Fan-out finished"
    );

    if with_text.is_empty() {
        return Err(ServiceError::NoContent {
            sources: items.len(),
        });
    }
    Ok(Aggregated {
        items: with_text,
        skipped: without,
    })
}
