//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_requests_total` (counter): requests by outcome
//! - `guard_rate_limited_total` (counter): 429s by endpoint policy
//! - `guard_csrf_rejections_total` (counter): 403s by reason
//! - `guard_webhook_verifications_total` (counter): webhook checks by result
//! - `guard_store_entries` (gauge): live entries per store after each sweep
//! - `guard_upstream_duration_seconds` (histogram): forwarding latency
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Count a request by pipeline outcome (`allowed`, `rate_limited`, `csrf_rejected`, ...).
pub fn record_request(outcome: &'static str) {
    counter!("guard_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_rate_limited(endpoint: &str) {
    counter!("guard_rate_limited_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub fn record_csrf_rejection(reason: &'static str) {
    counter!("guard_csrf_rejections_total", "reason" => reason).increment(1);
}

pub fn record_webhook_verification(result: &'static str) {
    counter!("guard_webhook_verifications_total", "result" => result).increment(1);
}

pub fn record_store_size(store: &'static str, size: usize) {
    gauge!("guard_store_entries", "store" => store).set(size as f64);
}

pub fn record_upstream(status: u16, start: Instant) {
    histogram!("guard_upstream_duration_seconds", "status" => status.to_string())
        .record(start.elapsed().as_secs_f64());
}
