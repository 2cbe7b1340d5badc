//! # Metrics
//!
//! Metric names and recording helpers. Recording goes through the `metrics`
//! facade; installing an exporter is left to the embedding application. Without
//! one every call here is a no-op.
//!
//! ## Recorded series
//! - `docproxy_origin_requests_total{method,endpoint}`
//! - `docproxy_origin_request_duration_seconds{method,endpoint}`
//! - `docproxy_errors_total{kind}`
//! - `docproxy_cache_lookups_total{tier,outcome}`
//! - `docproxy_cache_invalidations_total{scope}`
//! - `docproxy_gate_in_flight`

use std::time::Duration;

use crate::core::error::ProxyError;

pub const ORIGIN_REQUESTS_TOTAL: &str = "docproxy_origin_requests_total";
pub const ORIGIN_REQUEST_DURATION_SECONDS: &str = "docproxy_origin_request_duration_seconds";
pub const ERRORS_TOTAL: &str = "docproxy_errors_total";
pub const CACHE_LOOKUPS_TOTAL: &str = "docproxy_cache_lookups_total";
pub const CACHE_INVALIDATIONS_TOTAL: &str = "docproxy_cache_invalidations_total";
pub const GATE_IN_FLIGHT: &str = "docproxy_gate_in_flight";

/// Record one origin call, whatever its outcome
///
/// `endpoint` is the route template (`/documents/{id}`), never the concrete
/// path, so label cardinality stays bounded.
pub fn record_origin_request(method: &str, endpoint: &'static str, duration: Duration) {
    let method_owned = method.to_string();

    metrics::counter!(ORIGIN_REQUESTS_TOTAL, "method" => method_owned.clone(), "endpoint" => endpoint)
        .increment(1);
    metrics::histogram!(ORIGIN_REQUEST_DURATION_SECONDS, "method" => method_owned, "endpoint" => endpoint)
        .record(duration.as_secs_f64());
}

/// Record an error surfaced to a caller
pub fn record_error(error: &ProxyError) {
    metrics::counter!(ERRORS_TOTAL, "kind" => error.error_type()).increment(1);
}

/// Record a cache lookup outcome for one tier
pub fn record_cache_lookup(tier: &'static str, outcome: &'static str) {
    metrics::counter!(CACHE_LOOKUPS_TOTAL, "tier" => tier, "outcome" => outcome).increment(1);
}

/// Record removed entries, `scope` being `document` or `listing`
pub fn record_invalidation(scope: &'static str, removed: usize) {
    metrics::counter!(CACHE_INVALIDATIONS_TOTAL, "scope" => scope).increment(removed as u64);
}

/// Publish the number of origin calls currently holding a permit
pub fn set_gate_in_flight(in_flight: usize) {
    metrics::gauge!(GATE_IN_FLIGHT).set(in_flight as f64);
}
