//! # Metrics & Observability Module
//!
//! Module ini menyediakan metrics untuk ingress layer: HTTP API dan
//! peer fan-out. Metrics gateway di-export bersama dalam satu output.
//!
//! ## Metrics
//!
//! - `ingress_requests_total`: total request HTTP masuk
//! - `ingress_requests_by_status`: request per HTTP status code
//! - `ingress_aggregations_total` / `ingress_aggregation_failures_total`
//! - `ingress_peer_probes_total` / `ingress_peer_probe_failures_total`

use std::collections::HashMap;
use std::fmt::Write;

use chainmap_gateway::metrics::{write_counter, Counter};
use chainmap_gateway::GatewayMetrics;
use parking_lot::RwLock;

/// Counter per HTTP status code.
#[derive(Debug, Default)]
pub struct StatusCodeCounters {
    counters: RwLock<HashMap<u16, u64>>,
}

impl StatusCodeCounters {
    pub fn inc(&self, status: u16) {
        *self.counters.write().entry(status).or_insert(0) += 1;
    }

    pub fn get(&self, status: u16) -> u64 {
        self.counters.read().get(&status).copied().unwrap_or(0)
    }

    /// Semua pasangan (status, count), terurut by status.
    pub fn get_all(&self) -> Vec<(u16, u64)> {
        let mut all: Vec<_> = self.counters.read().iter().map(|(k, v)| (*k, *v)).collect();
        all.sort_by_key(|(k, _)| *k);
        all
    }
}

/// Metrics untuk ingress layer. Thread-safe.
#[derive(Debug, Default)]
pub struct IngressMetrics {
    pub requests_total: Counter,
    pub requests_by_status: StatusCodeCounters,
    pub aggregations_total: Counter,
    pub aggregation_failures: Counter,
    pub peer_probes_total: Counter,
    pub peer_probe_failures: Counter,
}

impl IngressMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, status: u16) {
        self.requests_total.inc();
        self.requests_by_status.inc(status);
    }

    /// Export ingress + gateway metrics dalam Prometheus text format.
    pub fn to_prometheus(&self, gateway: &GatewayMetrics) -> String {
        let mut output = String::with_capacity(4096);

        write_counter(
            &mut output,
            "ingress_requests_total",
            "Total number of requests received",
            self.requests_total.get(),
        );

        let _ = writeln!(output, "# HELP ingress_requests_by_status Requests by HTTP status code");
        let _ = writeln!(output, "# TYPE ingress_requests_by_status counter");
        for (status, count) in self.requests_by_status.get_all() {
            let _ = writeln!(output, "ingress_requests_by_status{{status=\"{}\"}} {}", status, count);
        }
        let _ = writeln!(output);

        write_counter(
            &mut output,
            "ingress_aggregations_total",
            "Network view aggregations started",
            self.aggregations_total.get(),
        );
        write_counter(
            &mut output,
            "ingress_aggregation_failures_total",
            "Aggregations that failed to load local system info",
            self.aggregation_failures.get(),
        );
        write_counter(
            &mut output,
            "ingress_peer_probes_total",
            "Peer status probes issued",
            self.peer_probes_total.get(),
        );
        write_counter(
            &mut output,
            "ingress_peer_probe_failures_total",
            "Peer probes that ended offline or error",
            self.peer_probe_failures.get(),
        );

        output.push_str(&gateway.to_prometheus());
        output
    }
}
