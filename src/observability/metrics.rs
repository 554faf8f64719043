//! Metrics collection and exposition.
//!
//! # Metrics
//! - `amp_cors_decisions_total` (counter): requests by `outcome`
//!   (passthrough, authorized, rejected)
//! - `gateway_upstream_requests_total` (counter): upstream responses by `status`
//! - `gateway_upstream_duration_seconds` (histogram): upstream latency

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Count one AMP policy decision.
pub fn record_amp_decision(outcome: &'static str) {
    metrics::counter!("amp_cors_decisions_total", "outcome" => outcome).increment(1);
}

/// Record an upstream exchange. `status` is 502 for connection failures.
pub fn record_upstream(status: u16, start: Instant) {
    metrics::counter!("gateway_upstream_requests_total", "status" => status.to_string())
        .increment(1);
    metrics::histogram!("gateway_upstream_duration_seconds")
        .record(start.elapsed().as_secs_f64());
}
