//! HTTP API for the Ferry service.
//!
//! This module provides the REST API endpoints for:
//! - Health and metrics monitoring
//! - Running and checking provider jobs
//! - Reranking sources
//! - Cancelling running operations
//! - Dynamic settings
//! - Serving stored outputs

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::FerryService;

pub mod files;
pub mod jobs;
pub mod operations;
pub mod rerank;
pub mod settings;
use files::serve_file_handler;
use jobs::{check_task_handler, run_job_handler};
use operations::cancel_operation_handler;
use rerank::rerank_handler;
use settings::{get_settings_handler, update_settings_handler};

/// Application state
pub struct AppState {
    pub service: Arc<FerryService>,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
}

/// Build the API router
pub fn router(service: Arc<FerryService>, metrics: Option<PrometheusHandle>) -> Router {
    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
        metrics,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Job endpoints
        .route("/jobs", post(run_job_handler))
        .route("/jobs/{provider}/{task_id}", get(check_task_handler))
        // Rerank endpoint
        .route("/rerank", post(rerank_handler))
        // Operation control
        .route("/operations/{id}/cancel", post(cancel_operation_handler))
        // Settings endpoints
        .route(
            "/settings",
            get(get_settings_handler).put(update_settings_handler),
        );

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/files/{dir}/{name}", get(serve_file_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health & Metrics ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        providers: state.service.provider_names(),
        running_operations: state.service.running_operations().len(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    providers: Vec<String>,
    running_operations: usize,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            "metrics recorder not installed\n".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteStore;
    use crate::service::test_support::service_with;
    use crate::testing::{FakeResolver, FakeStore, FakeUploader};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        let service = service_with(
            vec![Arc::new(FakeStore::new("docparse")) as Arc<dyn RemoteStore>],
            FakeResolver::default(),
            Arc::new(FakeUploader::default()),
            None,
        );
        router(Arc::new(service), None)
    }

    async fn call(request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[tokio::test]
    async fn test_health_lists_providers() {
        let (status, body) =
            call(Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["providers"], serde_json::json!(["docparse"]));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_404() {
        let request = Request::post("/api/jobs")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"provider":"ocr"}"#))
            .unwrap();
        let (status, body) = call(request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "provider_not_found");
    }

    #[tokio::test]
    async fn test_cancel_unknown_operation() {
        let request = Request::post("/api/operations/nope/cancel")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "operation_not_found");
    }

    #[tokio::test]
    async fn test_unknown_setting_rejected() {
        let request = Request::put("/api/settings")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"settings":{"fanout.width":4}}"#))
            .unwrap();
        let (status, body) = call(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation_error");
    }
}
