use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

mod api;
mod config;
mod content;
mod destination;
mod error;
mod fanout;
mod jobs;
mod lifecycle;
mod materialize;
mod remote;
mod rerank;
mod service;
mod telemetry;
#[cfg(test)]
mod testing;

use crate::config::RuntimeConfig;
use crate::service::FerryService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_logging();

    info!("Starting Ferry service v{}", env!("CARGO_PKG_VERSION"));

    // Static settings from file + FERRY__ env, dynamic defaults on top
    let runtime_config = Arc::new(RuntimeConfig::load()?);
    let static_config = &runtime_config.static_config;
    info!(
        host = %static_config.server.host,
        port = static_config.server.port,
        providers = static_config.providers.len(),
        "Configuration loaded"
    );

    // Ensure the output directory exists
    let outputs_dir = static_config.storage.data_dir.join("outputs");
    std::fs::create_dir_all(&outputs_dir)?;

    let metrics = telemetry::init_metrics();

    let service = Arc::new(FerryService::new(runtime_config.clone())?);
    if service.provider_names().is_empty() {
        warn!("No providers configured, job endpoints will reject every request");
    }

    let app = api::router(service, metrics);

    let addr = format!("{}:{}", static_config.server.host, static_config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
