//! # Peer Fan-out Aggregator
//!
//! Membangun satu view network yang konsisten dan ter-dedup dari:
//! - status node lokal (via [`RetryingGatewayClient::get_system_info`])
//! - probe langsung ke setiap peer yang dilaporkan node lokal
//!
//! ## Prinsip
//!
//! - Setiap probe berjalan di task tokio sendiri dengan timeout sendiri
//! - Join bersifat all-settled: satu peer yang hang, gagal, atau mengirim
//!   response rusak tidak pernah menggagalkan atau menunda peer lain
//! - Kegagalan peer diturunkan menjadi record `offline` / `error`,
//!   tidak pernah menjadi error agregasi
//! - Record lokal selalu di urutan pertama, sehingga menang saat dedup
//! - Tidak ada state yang dibawa antar call
//!
//! ## Alur
//!
//! ```text
//! system-info lokal ──► record lokal
//!        │
//!        └─► peersHttp ─► normalize ─► N probe konkuren ─► join_all
//!                                                           │
//!             [lokal, ...peers] ─► dedup ─► NetworkStats ◄──┘
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chainmap_gateway::{ConfigError, GatewayFailure, RetryingGatewayClient};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::metrics::IngressMetrics;
use crate::peer::{
    align_p2p_urls, dedup_records, non_empty_str, normalize_peers, resolve_node_id,
    NormalizedPeer, PeerRecord, PeerStatus, UNKNOWN,
};
use crate::stats::NetworkStats;

/// Default timeout per probe peer.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;

// ════════════════════════════════════════════════════════════════════════════
// ERRORS
// ════════════════════════════════════════════════════════════════════════════

/// Kegagalan level agregasi. Hanya terjadi jika data node lokal tidak ada.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("local system info unavailable: {0}")]
    Upstream(#[from] GatewayFailure),

    #[error("malformed local system info: {0}")]
    Malformed(String),
}

/// Kegagalan satu probe peer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProbeError {
    #[error("probe timed out after {0}ms")]
    Timeout(u64),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Transport(String),

    #[error("invalid JSON response: {0}")]
    Parse(String),
}

// ════════════════════════════════════════════════════════════════════════════
// OUTPUT
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSummary {
    pub local_node: String,
    pub p2p_connections: usize,
    pub total_peers: usize,
}

/// Snapshot network dari satu agregasi.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkView {
    pub success: bool,
    pub peers: Vec<PeerRecord>,
    pub stats: NetworkStats,
    pub network: NetworkSummary,
    pub timestamp: DateTime<Utc>,
}

/// Field yang dibaca dari `/system-info` milik peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerReport {
    pub node_id: Option<String>,
    pub block_height: u64,
    pub difficulty: u64,
    pub peer_count: u64,
}

impl PeerReport {
    pub fn from_system_info(data: &Value) -> Self {
        Self {
            node_id: non_empty_str(data.pointer("/blockchain/nodeId")).map(str::to_string),
            block_height: u64_at(data, "/blockchain/blockHeight"),
            difficulty: u64_at(data, "/blockchain/difficulty"),
            peer_count: data
                .pointer("/blockchain/network/peersHttp")
                .and_then(Value::as_array)
                .map(|a| a.len() as u64)
                .unwrap_or(0),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// AGGREGATOR
// ════════════════════════════════════════════════════════════════════════════

pub struct PeerFanoutAggregator {
    gateway: RetryingGatewayClient,
    http: Client,
    probe_timeout: Duration,
    metrics: Arc<IngressMetrics>,
}

impl PeerFanoutAggregator {
    pub fn new(
        gateway: RetryingGatewayClient,
        probe_timeout: Duration,
        metrics: Arc<IngressMetrics>,
    ) -> Result<Self, ConfigError> {
        if probe_timeout.is_zero() {
            return Err(ConfigError::Invalid("probe timeout must be positive".to_string()));
        }
        let http = Client::builder()
            .build()
            .map_err(|e| ConfigError::Invalid(format!("probe http client: {}", e)))?;

        Ok(Self {
            gateway,
            http,
            probe_timeout,
            metrics,
        })
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Bangun view network lengkap dari perspektif node lokal.
    pub async fn build_network_view(&self) -> Result<NetworkView, AggregationError> {
        self.metrics.aggregations_total.inc();
        let started = Instant::now();

        let info = match self.gateway.get_system_info().await {
            Ok(info) => info,
            Err(failure) => {
                self.metrics.aggregation_failures.inc();
                warn!(error = %failure.error, "cannot aggregate without local system info");
                return Err(failure.into());
            }
        };
        if info.stale {
            debug!("aggregating from stale local system info");
        }

        let local = match LocalView::parse(&info.data, self.gateway.base_url()) {
            Ok(local) => local,
            Err(e) => {
                self.metrics.aggregation_failures.inc();
                return Err(e);
            }
        };

        let peers = normalize_peers(&local.peers_http);
        let p2p_urls = align_p2p_urls(&peers, &local.peers_p2p);
        let probed = self.probe_all(&peers, &p2p_urls).await;

        let local_node = local.record.node_id.clone();
        let mut merged = Vec::with_capacity(probed.len() + 1);
        merged.push(local.record);
        merged.extend(probed);

        let peers = dedup_records(merged);
        let stats = NetworkStats::compute(&peers);

        info!(
            local_node = %local_node,
            total = stats.total,
            online = stats.online,
            offline = stats.offline,
            latency_ms = started.elapsed().as_millis() as u64,
            "network view aggregated"
        );

        Ok(NetworkView {
            success: true,
            peers,
            stats,
            network: NetworkSummary {
                local_node,
                p2p_connections: local.peers_p2p.len(),
                total_peers: local.peers_http.len(),
            },
            timestamp: Utc::now(),
        })
    }

    /// Probe semua peer secara konkuren; hasil mengikuti urutan input.
    async fn probe_all(&self, peers: &[NormalizedPeer], p2p_urls: &[String]) -> Vec<PeerRecord> {
        self.metrics.peer_probes_total.inc_by(peers.len() as u64);

        let http = self.http.clone();
        let timeout = self.probe_timeout;
        let records = settle_probes(peers, p2p_urls, move |peer, p2p_url| {
            let http = http.clone();
            async move { probe_peer(&http, &peer, p2p_url, timeout).await }
        })
        .await;

        for record in records.iter().filter(|r| !r.is_online()) {
            debug!(peer = %record.http_url, status = ?record.status, "peer not online");
            self.metrics.peer_probe_failures.inc();
        }
        records
    }
}

/// Jalankan satu task per peer lalu tunggu semuanya (all-settled).
///
/// Task yang panic atau dibatalkan menjadi record `error`; record lain
/// tidak terpengaruh dan urutan input dipertahankan.
async fn settle_probes<F, Fut>(
    peers: &[NormalizedPeer],
    p2p_urls: &[String],
    probe: F,
) -> Vec<PeerRecord>
where
    F: Fn(NormalizedPeer, String) -> Fut,
    Fut: Future<Output = PeerRecord> + Send + 'static,
{
    let tasks = peers.iter().zip(p2p_urls).map(|(peer, p2p_url)| {
        let started = Instant::now();
        let handle = tokio::spawn(probe(peer.clone(), p2p_url.clone()));
        async move {
            let joined = handle.await;
            (joined, started.elapsed().as_millis() as u64)
        }
    });

    join_all(tasks)
        .await
        .into_iter()
        .zip(peers.iter().zip(p2p_urls))
        .map(|((joined, elapsed), (peer, p2p_url))| match joined {
            Ok(record) => record,
            Err(e) => {
                error!(peer = %peer.http_url, error = %e, "probe task failed");
                task_error_record(peer, p2p_url, &e.to_string(), elapsed)
            }
        })
        .collect()
}

// ════════════════════════════════════════════════════════════════════════════
// LOCAL NODE
// ════════════════════════════════════════════════════════════════════════════

/// Record lokal plus daftar peer mentah dari `system-info` lokal.
struct LocalView {
    record: PeerRecord,
    peers_http: Vec<Value>,
    peers_p2p: Vec<Value>,
}

impl LocalView {
    fn parse(data: &Value, gateway_base: &str) -> Result<Self, AggregationError> {
        let chain = data
            .get("blockchain")
            .filter(|v| v.is_object())
            .ok_or_else(|| AggregationError::Malformed("missing blockchain section".to_string()))?;

        let array_at = |ptr: &str| -> Vec<Value> {
            chain
                .pointer(ptr)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };
        let peers_http = array_at("/network/peersHttp");
        let peers_p2p = array_at("/network/peersP2P");

        let http_url = non_empty_str(chain.get("httpUrl"))
            .or_else(|| non_empty_str(chain.pointer("/network/httpUrl")))
            .unwrap_or(gateway_base)
            .to_string();
        let p2p_url = non_empty_str(chain.get("p2pUrl"))
            .or_else(|| non_empty_str(chain.pointer("/network/p2pUrl")))
            .unwrap_or(UNKNOWN)
            .to_string();

        let report = PeerReport::from_system_info(data);
        let node_id = resolve_node_id(&[report.node_id.as_deref()], &http_url);

        let mut record = PeerRecord::new(node_id, http_url, p2p_url, PeerStatus::Online);
        record.is_local = true;
        record.block_height = report.block_height;
        record.difficulty = report.difficulty;
        record.peer_count = peers_http.len() as u64;
        record.last_seen = Some(Utc::now().to_rfc3339());
        record.response_time = 0;

        Ok(Self {
            record,
            peers_http,
            peers_p2p,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// PROBE
// ════════════════════════════════════════════════════════════════════════════

/// Probe satu peer. Tidak pernah gagal: semua outcome menjadi record.
pub async fn probe_peer(
    http: &Client,
    peer: &NormalizedPeer,
    p2p_url: String,
    timeout: Duration,
) -> PeerRecord {
    let started = Instant::now();
    let outcome = match tokio::time::timeout(timeout, fetch_report(http, &peer.http_url)).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout.as_millis() as u64)),
    };
    let elapsed = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(report) => {
            let node_id = resolve_node_id(
                &[report.node_id.as_deref(), peer.node_id.as_deref()],
                &peer.http_url,
            );
            debug!(peer = %peer.http_url, node_id = %node_id, latency_ms = elapsed, "peer online");

            let mut record = PeerRecord::new(node_id, peer.http_url.clone(), p2p_url, PeerStatus::Online);
            record.block_height = report.block_height;
            record.difficulty = report.difficulty;
            record.peer_count = report.peer_count;
            record.last_seen = Some(
                peer.last_seen
                    .clone()
                    .unwrap_or_else(|| Utc::now().to_rfc3339()),
            );
            record.response_time = elapsed;
            record
        }
        Err(e) => {
            warn!(peer = %peer.http_url, error = %e, latency_ms = elapsed, "peer probe failed");

            let node_id = resolve_node_id(&[peer.node_id.as_deref()], &peer.http_url);
            let mut record = PeerRecord::new(node_id, peer.http_url.clone(), p2p_url, PeerStatus::Offline);
            record.last_seen = peer.last_seen.clone();
            record.response_time = elapsed;
            record.error = Some(e.to_string());
            record
        }
    }
}

async fn fetch_report(http: &Client, http_url: &str) -> Result<PeerReport, ProbeError> {
    let url = format!("{}/system-info", http_url.trim().trim_end_matches('/'));
    let resp = http
        .get(&url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| ProbeError::Transport(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(ProbeError::Status(status.as_u16()));
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| ProbeError::Transport(e.to_string()))?;
    let data: Value = serde_json::from_slice(&bytes).map_err(|e| ProbeError::Parse(e.to_string()))?;
    Ok(PeerReport::from_system_info(&data))
}

/// Record minimal untuk task probe yang gagal di level runtime.
fn task_error_record(peer: &NormalizedPeer, p2p_url: &str, reason: &str, elapsed_ms: u64) -> PeerRecord {
    let node_id = resolve_node_id(&[peer.node_id.as_deref()], &peer.http_url);
    let mut record = PeerRecord::new(node_id, peer.http_url.clone(), p2p_url.to_string(), PeerStatus::Error);
    record.last_seen = peer.last_seen.clone();
    record.response_time = elapsed_ms;
    record.error = Some(format!("probe task failed: {}", reason));
    record
}

/// Integer non-negatif pada JSON pointer; 0 jika tidak ada atau tidak valid.
fn u64_at(data: &Value, ptr: &str) -> u64 {
    match data.pointer(ptr) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}
