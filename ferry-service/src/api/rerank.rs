//! Rerank API endpoint.

use axum::{Json, extract::State};
use std::sync::Arc;

use crate::error::ServiceError;
use crate::service::{RerankSourcesRequest, RerankSourcesResponse};

use super::AppState;

/// POST /api/rerank - download sources and rank them against a query
pub async fn rerank_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RerankSourcesRequest>,
) -> Result<Json<RerankSourcesResponse>, ServiceError> {
    Ok(Json(state.service.rerank_sources(request).await?))
}
