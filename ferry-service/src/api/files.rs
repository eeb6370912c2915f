//! Serves outputs stored by the local destination.

use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::ServiceError;

use super::AppState;

/// GET /files/{dir}/{name}
pub async fn serve_file_handler(
    State(state): State<Arc<AppState>>,
    Path((dir, name)): Path<(String, String)>,
) -> Result<Response, ServiceError> {
    let (data, mime_type) = state.service.read_stored_file(&dir, &name).await?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, mime_type)], data).into_response())
}
