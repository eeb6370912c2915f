//! Rank many sources against a query: fan out downloads, then one rerank call.

use tracing::info;

use crate::content::validate_source_url;
use crate::error::{ServiceError, ServiceResult};
use crate::fanout::aggregate;
use crate::service::{FerryService, RankedSource, RerankSourcesRequest, RerankSourcesResponse};

impl FerryService {
    pub async fn rerank_sources(
        &self,
        request: RerankSourcesRequest,
    ) -> ServiceResult<RerankSourcesResponse> {
        let reranker = self.reranker.clone().ok_or_else(|| ServiceError::Config {
            message: "No reranker configured".to_string(),
        })?;

        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(ServiceError::validation("query must not be empty"));
        }
        if request.sources.is_empty() {
            return Err(ServiceError::validation("sources must not be empty"));
        }
        for source in &request.sources {
            validate_source_url(source)?;
        }
        if request.top_n == Some(0) {
            return Err(ServiceError::validation("topN must be at least 1"));
        }

        let operation = self.register_operation(request.operation_id.clone())?;
        let concurrency = self.runtime_config.dynamic().fanout.concurrency;

        info!(
            operation_id = %operation.id,
            sources = request.sources.len(),
            concurrency,
            "Starting rerank over sources"
        );

        let aggregated = aggregate(
            &request.sources,
            concurrency,
            self.resolver.clone(),
            &operation.token,
        )
        .await?;

        let documents: Vec<String> = aggregated
            .items
            .iter()
            .filter_map(|item| item.extracted_text.clone())
            .collect();

        let scores = reranker
            .rerank(&query, &documents, request.top_n, &operation.token)
            .await?;

        let mut results: Vec<RankedSource> = scores
            .into_iter()
            .filter_map(|score| {
                Some(RankedSource {
                    source_ref: aggregated.items.get(score.index)?.source_ref.clone(),
                    relevance_score: score.relevance_score,
                    text: documents.get(score.index)?.clone(),
                })
            })
            .collect();
        results.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        if let Some(top_n) = request.top_n {
            results.truncate(top_n);
        }

        info!(
            operation_id = %operation.id,
            ranked = results.len(),
            skipped = aggregated.skipped.len(),
            "Rerank finished"
        );

        Ok(RerankSourcesResponse {
            operation_id: operation.id.clone(),
            query,
            results,
            skipped: aggregated.skipped,
        })
    }
}
