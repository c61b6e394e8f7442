//! Metrics collection and exposition.
//!
//! # Metrics
//! - `storefront_requests_total` (counter): requests by method, status
//! - `storefront_request_duration_seconds` (histogram): latency distribution
//! - `storefront_rate_limited_total` (counter): throttled requests by scope
//! - `storefront_validation_failures_total` (counter): rejected bodies
//! - `storefront_rate_limit_store_errors_total` (counter): store failures by
//!   failure policy
//!
//! # Design Decisions
//! - Labels are low-cardinality (no paths, no client addresses)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    counter!(
        "storefront_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("storefront_request_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_rate_limited(scope: &'static str) {
    counter!("storefront_rate_limited_total", "scope" => scope).increment(1);
}

pub fn record_validation_failure() {
    counter!("storefront_validation_failures_total").increment(1);
}

pub fn record_store_error(policy: &'static str) {
    counter!("storefront_rate_limit_store_errors_total", "policy" => policy).increment(1);
}
