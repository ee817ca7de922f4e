//! Metrics collection and exposition.
//!
//! # Metrics
//! - `custodial_lookup_attempts_total` (counter): lookup attempts by endpoint, outcome
//! - `custodial_sign_total` (counter): signing requests by outcome
//! - `custodial_broadcast_total` (counter): pushes by outcome
//! - `custodial_resolutions_total` (counter): account resolutions by outcome
//! - `custodial_cache_identities` (gauge): identities held in the credential cache

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_lookup_attempt(endpoint: &str, outcome: &'static str) {
    metrics::counter!(
        "custodial_lookup_attempts_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_sign(outcome: &'static str) {
    metrics::counter!("custodial_sign_total", "outcome" => outcome).increment(1);
}

pub fn record_broadcast(outcome: &'static str) {
    metrics::counter!("custodial_broadcast_total", "outcome" => outcome).increment(1);
}

pub fn record_resolution(outcome: &'static str) {
    metrics::counter!("custodial_resolutions_total", "outcome" => outcome).increment(1);
}

pub fn record_cache_identities(count: usize) {
    metrics::gauge!("custodial_cache_identities").set(count as f64);
}
