//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define client metrics (requests, latency, failures, health, sessions)
//! - Optionally expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `replica_client_requests_total` (counter): by method, status, endpoint
//! - `replica_client_request_duration_seconds` (histogram): latency distribution
//! - `replica_client_transport_failures_total` (counter): by endpoint
//! - `replica_client_endpoint_health` (gauge): 1=healthy, 0=unhealthy
//! - `replica_client_reconnect_attempts_total` (counter): by realtime endpoint
//! - `replica_client_session_connected` (gauge): 1 while a session is up
//!
//! # Design Decisions
//! - Recording without an installed recorder is a no-op
//! - Labels for endpoint and status code

use std::net::SocketAddr;
use std::time::Instant;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, endpoint: &str, start: Instant) {
    counter!(
        "replica_client_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
    histogram!(
        "replica_client_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record a transport-level failure against an endpoint.
pub fn record_transport_failure(endpoint: &str) {
    counter!("replica_client_transport_failures_total", "endpoint" => endpoint.to_string())
        .increment(1);
}

/// Record the current health flag of an endpoint.
pub fn record_endpoint_health(endpoint: &str, healthy: bool) {
    gauge!("replica_client_endpoint_health", "endpoint" => endpoint.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

/// Record a failed realtime connection attempt.
pub fn record_reconnect_attempt(endpoint: &str) {
    counter!("replica_client_reconnect_attempts_total", "endpoint" => endpoint.to_string())
        .increment(1);
}

/// Record whether the realtime session is connected.
pub fn record_session_connected(connected: bool) {
    gauge!("replica_client_session_connected").set(if connected { 1.0 } else { 0.0 });
}
