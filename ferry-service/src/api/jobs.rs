//! Job API endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use std::sync::Arc;

use crate::error::ServiceError;
use crate::service::{JobOperationRequest, JobOperationResponse, TaskQuery, TaskStatusResponse};

use super::AppState;

/// POST /api/jobs - run a job, waiting for it unless `wait` is false
pub async fn run_job_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JobOperationRequest>,
) -> Result<Json<JobOperationResponse>, ServiceError> {
    let response = state.service.run_job_operation(request).await?;
    Ok(Json(response))
}

/// GET /api/jobs/{provider}/{task_id} - check a previously submitted task
pub async fn check_task_handler(
    State(state): State<Arc<AppState>>,
    Path((provider, task_id)): Path<(String, String)>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<TaskStatusResponse>, ServiceError> {
    let response = state.service.check_task(&provider, &task_id, query).await?;
    Ok(Json(response))
}
