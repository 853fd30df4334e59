//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_upstream_errors_total` (counter): forwarding failures by reason
//! - `proxy_plugin_executions_total` (counter): plugin runs by plugin, phase
//! - `proxy_rate_limited_total` (counter): requests rejected by rate limiting
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Label values are bounded (method, status, factory name)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics exporter listening");
        }
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn describe() {
    describe_counter!("proxy_requests_total", "Total requests handled by the proxy");
    describe_histogram!(
        "proxy_request_duration_seconds",
        "End-to-end request latency in seconds"
    );
    describe_counter!(
        "proxy_upstream_errors_total",
        "Requests the forwarder could not complete upstream"
    );
    describe_counter!(
        "proxy_plugin_executions_total",
        "Plugin hook executions"
    );
    describe_counter!(
        "proxy_rate_limited_total",
        "Requests rejected by the ratelimit plugin"
    );
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a forwarding failure (`connect`, `timeout`, `loop`, `invalid_target`).
pub fn record_upstream_error(reason: &'static str) {
    counter!("proxy_upstream_errors_total", "reason" => reason).increment(1);
}

pub fn record_plugin_execution(plugin: &str, phase: &str) {
    counter!(
        "proxy_plugin_executions_total",
        "plugin" => plugin.to_string(),
        "phase" => phase.to_string()
    )
    .increment(1);
}

pub fn record_rate_limited(key_kind: &'static str) {
    counter!("proxy_rate_limited_total", "key" => key_kind).increment(1);
}
