//! Downstream relevance ranking over merged fan-out texts.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RerankConfig;
use crate::error::{ServiceError, ServiceResult};

const RERANK_PROVIDER: &str = "rerank";

/// Relevance of one document, by its position in the submitted list
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RerankScore {
    pub index: usize,
    pub relevance_score: f64,
}

/// Scores documents against a query in a single call
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: Option<usize>,
        cancel: &CancellationToken,
    ) -> ServiceResult<Vec<RerankScore>>;
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    top_n: Option<usize>,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankScore>,
}

/// Cohere/Jina-style `/v1/rerank` client
pub struct HttpReranker {
    client: Client,
    url: String,
    config: RerankConfig,
}

impl HttpReranker {
    pub fn new(config: RerankConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to create rerank client: {}", e),
            })?;

        Ok(Self {
            client,
            url: format!("{}{}", config.base_url.trim_end_matches('/'), config.path),
            config,
        })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: Option<usize>,
        cancel: &CancellationToken,
    ) -> ServiceResult<Vec<RerankScore>> {
        let mut request = self.client.post(&self.url).json(&RerankRequest {
            model: &self.config.model,
            query,
            documents,
            top_n,
        });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
            sent = request.send() => sent,
        };
        let response = sent.map_err(|e| ServiceError::Transport {
            provider: RERANK_PROVIDER.to_string(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Provider {
                provider: RERANK_PROVIDER.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.text().await.map_err(|e| ServiceError::Transport {
            provider: RERANK_PROVIDER.to_string(),
            source: e,
        })?;
        let parsed: RerankResponse =
            serde_json::from_str(&body).map_err(|e| ServiceError::Provider {
                provider: RERANK_PROVIDER.to_string(),
                status: status.as_u16(),
                body: format!("invalid rerank response ({}): {}", e, body),
            })?;

        debug!(documents = documents.len(), results = parsed.results.len(), "Rerank finished");
        Ok(valid_scores(parsed.results, documents.len()))
    }
}

/// Drop scores pointing outside the submitted list
fn valid_scores(scores: Vec<RerankScore>, documents: usize) -> Vec<RerankScore> {
    scores
        .into_iter()
        .filter(|score| {
            let valid = score.index < documents;
            if !valid {
                warn!(index = score.index, documents, "Reranker returned out-of-range index");
            }
            valid
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let documents = vec!["a".to_string(), "b".to_string()];
        let body = serde_json::to_value(RerankRequest {
            model: "rerank-v3",
            query: "fish",
            documents: &documents,
            top_n: None,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "model": "rerank-v3", "query": "fish", "documents": ["a", "b"] })
        );
    }

    #[test]
    fn test_out_of_range_scores_dropped() {
        let parsed: RerankResponse = serde_json::from_str(
            r#"{"results":[{"index":1,"relevance_score":0.9},{"index":5,"relevance_score":0.8}]}"#,
        )
        .unwrap();
        let scores = valid_scores(parsed.results, 2);
        assert_eq!(
            scores,
            vec![RerankScore {
                index: 1,
                relevance_score: 0.9
            }]
        );
    }
}
