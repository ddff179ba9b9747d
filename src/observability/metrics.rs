//! Metrics collection and exposition.
//!
//! # Metrics
//! - `namerouter_requests_total` (counter): terminal dispatch outcomes
//! - `namerouter_rate_limited_total` (counter): rejections by network class
//! - `namerouter_redirects_total` (counter): HTTP to HTTPS upgrades
//! - `namerouter_auth_denied_total` (counter): auth gate rejections
//! - `namerouter_visitors` (gauge): tracked rate-limiter entries
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics exporter"),
    }
}

pub fn record_request(outcome: &'static str) {
    metrics::counter!("namerouter_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_rate_limited(class: &'static str) {
    metrics::counter!("namerouter_rate_limited_total", "class" => class).increment(1);
}

pub fn record_redirect() {
    metrics::counter!("namerouter_redirects_total").increment(1);
}

pub fn record_auth_denied() {
    metrics::counter!("namerouter_auth_denied_total").increment(1);
}

pub fn record_visitors(count: usize) {
    metrics::gauge!("namerouter_visitors").set(count as f64);
}
