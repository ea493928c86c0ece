//! Metrics collection and exposition.
//!
//! # Metrics
//! - `trustgate_validator_outcomes_total` (counter): per validator, per outcome
//! - `trustgate_requests_blocked_total` (counter): blocked requests
//! - `trustgate_handshake_results_total` (counter): accept/reject per side
//! - `trustgate_revocation_cache_total` (counter): hit/miss
//! - `trustgate_transparency_cache_total` (counter): hit/miss
//! - `trustgate_connections_rejected_total` (counter): over-limit endpoints
//!
//! # Design Decisions
//! - Low-overhead updates (atomic counters under the hood)
//! - Prometheus exposition on a dedicated listener

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on its own listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(_) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one validator execution outcome: "pass", "violation" or "error".
pub fn record_validator_outcome(validator: &'static str, outcome: &'static str) {
    counter!(
        "trustgate_validator_outcomes_total",
        "validator" => validator,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a blocked request decision.
pub fn record_request_blocked() {
    counter!("trustgate_requests_blocked_total").increment(1);
}

/// Record a handshake validation result. `side` is "server" or "client".
pub fn record_handshake(side: &'static str, accepted: bool) {
    counter!(
        "trustgate_handshake_results_total",
        "side" => side,
        "result" => if accepted { "accept" } else { "reject" }
    )
    .increment(1);
}

/// Record a revocation cache lookup.
pub fn record_revocation_cache(hit: bool) {
    counter!(
        "trustgate_revocation_cache_total",
        "result" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

/// Record a transparency cache lookup.
pub fn record_transparency_cache(hit: bool) {
    counter!(
        "trustgate_transparency_cache_total",
        "result" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

/// Record a connection rejected by the per-endpoint limit.
pub fn record_connection_rejected() {
    counter!("trustgate_connections_rejected_total").increment(1);
}
