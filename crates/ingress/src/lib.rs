//! # chainmap-ingress
//!
//! Peer fan-out aggregator dan HTTP API untuk dashboard peta network.
//!
//! ## Architecture
//! ```text
//! Dashboard → Ingress API → PeerFanoutAggregator → RetryingGatewayClient → Node
//!                                   │
//!                                   └──→ probe langsung ke setiap peer
//! ```
//!
//! ## Modules
//! - peer: record peer, normalisasi, dedup
//! - stats: statistik network
//! - aggregator: fan-out all-settled ke peer
//! - geo: seam enrichment koordinat
//! - config: konfigurasi ingress
//! - metrics: observability
//! - api: router axum

pub mod aggregator;
pub mod api;
pub mod config;
pub mod geo;
pub mod metrics;
pub mod peer;
pub mod stats;

pub use aggregator::{AggregationError, NetworkSummary, NetworkView, PeerFanoutAggregator, ProbeError};
pub use api::{router, AppState};
pub use config::IngressConfig;
pub use geo::{CoordinateEnricher, GeoConfig, GeoLocation, StaticGeoEnricher};
pub use metrics::IngressMetrics;
pub use peer::{PeerRecord, PeerStatus};
pub use stats::NetworkStats;
