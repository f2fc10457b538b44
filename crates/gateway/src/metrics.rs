//! # Gateway Metrics
//!
//! Counter atomik untuk `RetryingGatewayClient`.
//!
//! ## Prinsip
//!
//! - Semua metrics thread-safe (atomic operations)
//! - Prometheus exposition format yang valid
//!
//! ## Metrics
//!
//! - `gateway_requests_total`: total call ke `request()`
//! - `gateway_network_calls_total`: HTTP call yang benar-benar dikirim
//! - `gateway_cache_fresh_hits_total` / `gateway_cache_stale_hits_total`
//! - `gateway_cache_misses_total`
//! - `gateway_dedup_joins_total`: caller yang bergabung ke eksekusi inflight
//! - `gateway_retries_total`, `gateway_rate_limited_total`, `gateway_failures_total`

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

// ════════════════════════════════════════════════════════════════════════════
// COUNTER
// ════════════════════════════════════════════════════════════════════════════

/// Thread-safe counter menggunakan atomic operations.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Increment counter by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::SeqCst);
    }

    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::SeqCst);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

/// Tulis satu counter dalam format Prometheus.
pub fn write_counter(output: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(output, "# HELP {} {}", name, help);
    let _ = writeln!(output, "# TYPE {} counter", name);
    let _ = writeln!(output, "{} {}", name, value);
    let _ = writeln!(output);
}

// ════════════════════════════════════════════════════════════════════════════
// GATEWAY METRICS
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct GatewayMetrics {
    pub requests_total: Counter,
    pub network_calls_total: Counter,
    pub cache_fresh_hits: Counter,
    pub cache_stale_hits: Counter,
    pub cache_misses: Counter,
    pub dedup_joins: Counter,
    pub retries_total: Counter,
    pub rate_limited_total: Counter,
    pub failures_total: Counter,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export metrics dalam Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        write_counter(
            &mut output,
            "gateway_requests_total",
            "Total gateway requests",
            self.requests_total.get(),
        );
        write_counter(
            &mut output,
            "gateway_network_calls_total",
            "HTTP calls issued to the upstream node",
            self.network_calls_total.get(),
        );
        write_counter(
            &mut output,
            "gateway_cache_fresh_hits_total",
            "Requests served from a fresh cache entry",
            self.cache_fresh_hits.get(),
        );
        write_counter(
            &mut output,
            "gateway_cache_stale_hits_total",
            "Requests served from an expired cache entry",
            self.cache_stale_hits.get(),
        );
        write_counter(
            &mut output,
            "gateway_cache_misses_total",
            "Requests with no usable fresh cache entry",
            self.cache_misses.get(),
        );
        write_counter(
            &mut output,
            "gateway_dedup_joins_total",
            "Callers that joined an in-flight execution",
            self.dedup_joins.get(),
        );
        write_counter(
            &mut output,
            "gateway_retries_total",
            "Retry attempts after a failed upstream call",
            self.retries_total.get(),
        );
        write_counter(
            &mut output,
            "gateway_rate_limited_total",
            "Upstream responses with HTTP 429",
            self.rate_limited_total.get(),
        );
        write_counter(
            &mut output,
            "gateway_failures_total",
            "Requests resolved to a failure value",
            self.failures_total.get(),
        );

        output
    }
}
