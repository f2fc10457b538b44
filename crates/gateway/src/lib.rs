//! # chainmap-gateway
//!
//! Client yang tahan gangguan untuk satu node blockchain upstream.
//!
//! Crate ini menyediakan:
//! - [`ResponseCache`]: cache time-boxed yang bisa menyajikan entry stale
//! - [`InflightRegistry`]: collapse request konkuren dengan signature identik
//! - [`RetryingGatewayClient`]: retry + backoff linear + kebijakan rate-limit
//!
//! Semua operasi mengembalikan [`GatewayResult`]; kegagalan operasional tidak
//! pernah menjadi panic.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod cache;
pub mod client;
pub mod config;
pub mod inflight;
pub mod metrics;
pub mod response;
pub mod retry_after;
pub mod signature;

pub use cache::{CacheEntry, CacheLookup, ResponseCache};
pub use client::{AttemptError, RequestOptions, RetryingGatewayClient};
pub use config::{CacheTtlConfig, ConfigError, GatewayConfig};
pub use inflight::{InflightGuard, InflightRegistry, Joined};
pub use metrics::{Counter, GatewayMetrics};
pub use response::{GatewayFailure, GatewayResult, GatewaySuccess};
pub use signature::{Method, RequestSignature};

/// Current timestamp dalam Unix milliseconds.
pub(crate) fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
