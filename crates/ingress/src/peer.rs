//! # Peer Records
//!
//! Unit output aggregator: satu [`PeerRecord`] per node yang diketahui
//! network, plus helper normalisasi untuk daftar peer mentah dari upstream.
//!
//! ## Invariant
//!
//! - `http_url` di-trim, dan unik dalam satu hasil agregasi (lihat
//!   [`dedup_records`]); occurrence pertama menang
//! - `error` hanya ada jika `status != online`
//! - `response_time` selalu terisi, termasuk saat probe gagal

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use url::Url;

/// Placeholder untuk alamat yang tidak diketahui.
pub const UNKNOWN: &str = "unknown";

// ════════════════════════════════════════════════════════════════════════════
// PEER STATUS
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    Online,
    Offline,
    Error,
}

// ════════════════════════════════════════════════════════════════════════════
// PEER RECORD
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    pub node_id: String,
    pub http_url: String,
    pub p2p_url: String,
    pub is_local: bool,
    pub status: PeerStatus,
    pub block_height: u64,
    pub difficulty: u64,
    /// Jumlah peer yang dilaporkan node ini.
    pub peer_count: u64,
    /// ISO-8601, atau `null`.
    pub last_seen: Option<String>,
    /// Milliseconds untuk probe (0 untuk node lokal).
    pub response_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl PeerRecord {
    /// Record kosong dengan status tertentu; field numerik 0.
    pub fn new(node_id: String, http_url: String, p2p_url: String, status: PeerStatus) -> Self {
        Self {
            node_id,
            http_url,
            p2p_url,
            is_local: false,
            status,
            block_height: 0,
            difficulty: 0,
            peer_count: 0,
            last_seen: None,
            response_time: 0,
            error: None,
            lat: None,
            lng: None,
            city: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == PeerStatus::Online
    }

    pub fn has_location(&self) -> bool {
        self.lat.is_some() && self.lng.is_some()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// NORMALIZATION
// ════════════════════════════════════════════════════════════════════════════

/// Entry peer setelah normalisasi dari `peersHttp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPeer {
    pub http_url: String,
    pub node_id: Option<String>,
    pub last_seen: Option<String>,
    /// P2P url dari entry terstruktur, jika upstream mengirimnya.
    pub p2p_url: Option<String>,
}

/// Normalisasi daftar peer heterogen.
///
/// - string → `{http_url: string, node_id: None, last_seen: None}`
/// - object → `httpUrl ?? url ?? "unknown"`, plus `nodeId`, `lastSeen`, `p2pUrl`
/// - nilai lain → `http_url = "unknown"`
pub fn normalize_peers(raw: &[Value]) -> Vec<NormalizedPeer> {
    raw.iter().map(normalize_peer).collect()
}

fn normalize_peer(value: &Value) -> NormalizedPeer {
    match value {
        Value::String(s) => NormalizedPeer {
            http_url: s.trim().to_string(),
            node_id: None,
            last_seen: None,
            p2p_url: None,
        },
        Value::Object(obj) => {
            let http_url = non_empty_str(obj.get("httpUrl"))
                .or_else(|| non_empty_str(obj.get("url")))
                .unwrap_or(UNKNOWN);
            NormalizedPeer {
                http_url: http_url.to_string(),
                node_id: non_empty_str(obj.get("nodeId")).map(str::to_string),
                last_seen: non_empty_str(obj.get("lastSeen")).map(str::to_string),
                p2p_url: non_empty_str(obj.get("p2pUrl")).map(str::to_string),
            }
        }
        _ => NormalizedPeer {
            http_url: UNKNOWN.to_string(),
            node_id: None,
            last_seen: None,
            p2p_url: None,
        },
    }
}

/// String JSON yang sudah di-trim dan tidak kosong.
pub fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Pasangkan setiap peer dengan P2P url-nya.
///
/// Entry terstruktur (`p2pUrl`) selalu menang. Join posisional ke
/// `peersP2P` hanya dipakai jika panjang kedua array sama; selain itu peer
/// tanpa `p2pUrl` mendapat `"unknown"`.
pub fn align_p2p_urls(peers: &[NormalizedPeer], peers_p2p: &[Value]) -> Vec<String> {
    let positional = peers.len() == peers_p2p.len();
    if !positional && !peers_p2p.is_empty() {
        warn!(
            peers_http = peers.len(),
            peers_p2p = peers_p2p.len(),
            "peersHttp/peersP2P length mismatch, positional join disabled"
        );
    }

    peers
        .iter()
        .enumerate()
        .map(|(i, peer)| {
            if let Some(p2p) = &peer.p2p_url {
                return p2p.clone();
            }
            if positional {
                if let Some(p2p) = non_empty_str(peers_p2p.get(i)) {
                    return p2p.to_string();
                }
            }
            UNKNOWN.to_string()
        })
        .collect()
}

// ════════════════════════════════════════════════════════════════════════════
// NODE ID
// ════════════════════════════════════════════════════════════════════════════

/// Synthesize node id dari url: `node-<port>`, selain itu
/// `node-<hostname tanpa karakter non-word>`.
pub fn derive_node_id(http_url: &str) -> String {
    let parsed = match Url::parse(http_url.trim()) {
        Ok(u) => u,
        Err(_) => return format!("node-{}", UNKNOWN),
    };

    if let Some(port) = parsed.port() {
        return format!("node-{}", port);
    }

    let host: String = parsed
        .host_str()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if host.is_empty() {
        format!("node-{}", UNKNOWN)
    } else {
        format!("node-{}", host)
    }
}

/// Kandidat id pertama yang valid (tidak kosong, bukan `"unknown"`),
/// atau id hasil [`derive_node_id`].
pub fn resolve_node_id(candidates: &[Option<&str>], http_url: &str) -> String {
    candidates
        .iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty() && *s != UNKNOWN)
        .map(str::to_string)
        .unwrap_or_else(|| derive_node_id(http_url))
}

// ════════════════════════════════════════════════════════════════════════════
// DEDUP
// ════════════════════════════════════════════════════════════════════════════

/// Bentuk kanonik url untuk perbandingan: di-trim, di-parse, tanpa trailing `/`.
///
/// `None` untuk url kosong atau `"unknown"`.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == UNKNOWN {
        return None;
    }
    let canonical = match Url::parse(trimmed) {
        Ok(u) => u.to_string(),
        Err(_) => trimmed.to_string(),
    };
    Some(canonical.trim_end_matches('/').to_string())
}

/// Key dedup: url ternormalisasi, fallback ke node id.
pub fn dedup_key(record: &PeerRecord) -> String {
    normalize_url(&record.http_url).unwrap_or_else(|| format!("id:{}", record.node_id))
}

/// Dedup dengan occurrence pertama menang; urutan dipertahankan.
pub fn dedup_records(records: Vec<PeerRecord>) -> Vec<PeerRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(dedup_key(r)))
        .collect()
}
