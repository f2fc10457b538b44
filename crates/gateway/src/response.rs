//! Tagged result untuk setiap operasi gateway.
//!
//! Gateway tidak pernah mengembalikan error operasional lewat panic: setiap
//! operasi mengembalikan [`GatewayResult`], dan caller wajib branch pada
//! `Ok` / `Err`. Bentuk JSON-nya (`success: true|false`) dipakai apa adanya
//! oleh HTTP API layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result satu operasi gateway.
pub type GatewayResult = Result<GatewaySuccess, GatewayFailure>;

/// Response sukses, baik dari network maupun dari cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySuccess {
    /// JSON body dari upstream.
    pub data: Value,
    /// Waktu response diterima dari upstream.
    pub timestamp: DateTime<Utc>,
    pub cache_hit: bool,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl GatewaySuccess {
    /// Response baru dari network.
    pub fn fresh(data: Value) -> Self {
        Self {
            data,
            timestamp: Utc::now(),
            cache_hit: false,
            stale: false,
            warning: None,
        }
    }

    /// Tandai sebagai cache hit.
    pub fn into_cache_hit(mut self, stale: bool, warning: Option<String>) -> Self {
        self.cache_hit = true;
        self.stale = stale;
        self.warning = warning;
        self
    }
}

/// Failure value setelah retry habis dan tidak ada cache yang bisa dipakai.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayFailure {
    /// Pesan error yang bisa dibaca manusia.
    pub error: String,
    pub endpoint: String,
    pub timestamp: DateTime<Utc>,
    /// HTTP status terakhir dari upstream, jika ada.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl GatewayFailure {
    pub fn new(error: impl Into<String>, endpoint: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            error: error.into(),
            endpoint: endpoint.into(),
            timestamp: Utc::now(),
            status,
        }
    }
}

impl std::fmt::Display for GatewayFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.error, self.endpoint)
    }
}

impl std::error::Error for GatewayFailure {}

/// Render result sebagai JSON dengan flag `success`.
pub fn to_json(result: &GatewayResult) -> Value {
    let (success, body) = match result {
        Ok(s) => (true, serde_json::to_value(s)),
        Err(f) => (false, serde_json::to_value(f)),
    };

    let mut value = match body {
        Ok(Value::Object(map)) => Value::Object(map),
        _ => serde_json::json!({}),
    };
    if let Value::Object(map) = &mut value {
        map.insert("success".to_string(), Value::Bool(success));
    }
    value
}
