//! Operation control endpoints.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::ServiceError;

use super::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub operation_id: String,
    pub cancelled: bool,
}

/// POST /api/operations/{id}/cancel - cancel a running operation; its cleanup still runs
pub async fn cancel_operation_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ServiceError> {
    state.service.cancel_operation(&id)?;
    Ok(Json(CancelResponse {
        operation_id: id,
        cancelled: true,
    }))
}
