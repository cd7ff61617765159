//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (connections, requests, errors, bytes)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_connections_accepted_total` (counter)
//! - `proxy_connections_rejected_total` (counter): refused at capacity
//! - `proxy_active_connections` (gauge): occupied registry slots
//! - `proxy_requests_total` (counter): by `kind` (http, connect)
//! - `proxy_errors_total` (counter): by `kind` and `status`
//! - `proxy_relay_bytes_total` (counter): by `direction`
//! - `proxy_session_duration_seconds` (histogram)
//!
//! # Design Decisions
//! - Recording is a no-op until [`init_metrics`] installs the exporter
//! - Labels are static strings, never hostnames

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::relay::RelayStats;

/// Install the Prometheus exporter and its HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!("proxy_connections_accepted_total", "Client connections accepted");
    describe_counter!(
        "proxy_connections_rejected_total",
        "Client connections refused with 503 at capacity"
    );
    describe_gauge!("proxy_active_connections", "Connections holding a registry slot");
    describe_counter!("proxy_requests_total", "Parsed client requests");
    describe_counter!("proxy_errors_total", "Sessions that ended in an error");
    describe_counter!("proxy_relay_bytes_total", "Bytes relayed between client and upstream");
    describe_histogram!("proxy_session_duration_seconds", "Session lifetime from admission to close");

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_accepted() {
    counter!("proxy_connections_accepted_total").increment(1);
}

pub fn record_rejected() {
    counter!("proxy_connections_rejected_total").increment(1);
}

pub fn set_active_connections(count: usize) {
    gauge!("proxy_active_connections").set(count as f64);
}

/// Count a parsed request; `kind` is "http" or "connect".
pub fn record_request(kind: &'static str) {
    counter!("proxy_requests_total", "kind" => kind).increment(1);
}

/// Count a failed session. `status` is the error page sent, if any.
pub fn record_error(kind: &'static str, status: Option<u16>) {
    let status = status.map_or_else(|| "none".to_string(), |s| s.to_string());
    counter!("proxy_errors_total", "kind" => kind, "status" => status).increment(1);
}

pub fn record_relay_bytes(stats: &RelayStats) {
    counter!("proxy_relay_bytes_total", "direction" => "client_to_upstream").increment(stats.bytes_up);
    counter!("proxy_relay_bytes_total", "direction" => "upstream_to_client").increment(stats.bytes_down);
}

pub fn record_session_duration(started: Instant) {
    histogram!("proxy_session_duration_seconds").record(started.elapsed().as_secs_f64());
}
