//! Metrics collection.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, redirects, fallbacks, health)
//! - Record through the `metrics` facade; exposition is left to whichever
//!   recorder the embedding process installs
//!
//! # Metrics
//! - `proxy_requests_total` (counter): forwarded requests by method, status, upstream
//! - `proxy_request_duration_seconds` (histogram): upstream latency
//! - `proxy_redirect_lookups_total` (counter): lookups by outcome (hit, miss, error)
//! - `proxy_fallback_total` (counter): combinator decisions (replayed, delegated)
//! - `proxy_health_check` (gauge): 1=healthy, 0=unhealthy, per check

use std::time::Instant;

use metrics::{counter, gauge, histogram};

/// Record a forwarded request.
pub fn record_request(method: &str, status: u16, upstream: &str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "upstream" => upstream.to_string()
    )
    .increment(1);

    histogram!("proxy_request_duration_seconds", "upstream" => upstream.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_redirect_lookup(outcome: &'static str) {
    counter!("proxy_redirect_lookups_total", "outcome" => outcome).increment(1);
}

pub fn record_fallback(outcome: &'static str) {
    counter!("proxy_fallback_total", "outcome" => outcome).increment(1);
}

pub fn record_health_check(check: &str, healthy: bool) {
    gauge!("proxy_health_check", "check" => check.to_string()).set(if healthy { 1.0 } else { 0.0 });
}
