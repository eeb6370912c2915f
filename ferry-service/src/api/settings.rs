//! Settings API endpoints for reading and hot-reloading dynamic configuration.

use axum::{Json, extract::State};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ServiceError;
use crate::service::SettingsResponse;

use super::AppState;

/// Request body for PUT /api/settings
#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    /// Settings to update (key -> value). Use null to revert to default.
    pub settings: HashMap<String, serde_json::Value>,
}

/// GET /api/settings - retrieve all settings with their current values
pub async fn get_settings_handler(State(state): State<Arc<AppState>>) -> Json<SettingsResponse> {
    Json(state.service.settings())
}

/// PUT /api/settings - update settings (triggers hot reload)
pub async fn update_settings_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<SettingsResponse>, ServiceError> {
    Ok(Json(state.service.update_settings(request.settings)?))
}
