//! Prometheus metrics for the applause service.
//!
//! # Usage
//!
//! ```rust,ignore
//! use applause_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9091, handle).await.unwrap();
//! }
//! ```
//!
//! # Metrics
//!
//! - `applause_peek_total{result}`: read requests (`ok`, `invalid_url`)
//! - `applause_toggle_total{result}`: toggle requests (`clapped`, `unclapped`,
//!   `unauthorized`, `invalid_url`)
//! - `applause_storage_errors_total{operation}`: failed store transactions
//!
//! Without an installed recorder the helpers are no-ops.

use axum::{Router, routing::get};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_metrics();

    handle
}

/// Serve `/metrics` on `port` from a background task.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "metrics server stopped");
        }
    });

    Ok(())
}

fn register_metrics() {
    describe_counter!(
        "applause_peek_total",
        "Clap count reads, labelled by result"
    );
    describe_counter!(
        "applause_toggle_total",
        "Clap toggles, labelled by result"
    );
    describe_counter!(
        "applause_storage_errors_total",
        "Store transactions that failed, labelled by operation"
    );
}

pub(crate) fn record_peek(result: &'static str) {
    metrics::counter!("applause_peek_total", "result" => result).increment(1);
}

pub(crate) fn record_toggle(result: &'static str) {
    metrics::counter!("applause_toggle_total", "result" => result).increment(1);
}

pub(crate) fn record_storage_error(operation: &'static str) {
    metrics::counter!("applause_storage_errors_total", "operation" => operation).increment(1);
}
