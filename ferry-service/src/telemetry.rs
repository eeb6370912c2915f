//! Logging and metrics setup.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::warn;

pub fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ferry_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}

/// Install the global Prometheus recorder; `None` leaves metrics as no-ops
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            describe_metrics();
            Some(handle)
        }
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed, /metrics disabled");
            None
        }
    }
}

fn describe_metrics() {
    metrics::describe_counter!(
        "ferry_jobs_submitted_total",
        "Jobs accepted by a provider"
    );
    metrics::describe_counter!(
        "ferry_jobs_completed_total",
        "Jobs that reached an outcome, by outcome"
    );
    metrics::describe_histogram!(
        "ferry_job_wait_seconds",
        metrics::Unit::Seconds,
        "Time from submission to the final poll"
    );
    metrics::describe_counter!(
        "ferry_cleanup_failures_total",
        "Remote artifact deletes that failed or panicked"
    );
    metrics::describe_counter!(
        "ferry_fanout_items_total",
        "Fan-out sources, by whether they produced text"
    );
}
