//! Gateway configuration.
//!
//! Typed config untuk `RetryingGatewayClient`, dibaca dari TOML dan/atau
//! environment variables. Semua angka kebijakan (retry, backoff, TTL per
//! endpoint) ada di sini, bukan tersebar di call site.
//!
//! Environment variables:
//! - `CHAINMAP_UPSTREAM_URL`: base URL node upstream
//! - `CHAINMAP_MAX_RETRIES`: jumlah attempt maksimum (default: 3)
//! - `CHAINMAP_RETRY_DELAY_MS`: base delay backoff linear (default: 4000)
//! - `CHAINMAP_REQUEST_TIMEOUT_MS`: timeout per HTTP call (default: 10000)
//! - `CHAINMAP_ALLOW_STALE_ON_ERROR`: `true`/`false` (default: true)
//! - `CHAINMAP_MAX_STALE_MS`: batas staleness sejak expired (default: tanpa batas)
//! - `CHAINMAP_MAX_RETRY_AFTER_MS`: batas menunggu `Retry-After` (default: 60000)

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Default base URL node upstream.
pub const DEFAULT_UPSTREAM_URL: &str = "http://127.0.0.1:3001";

/// Default jumlah attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay untuk backoff linear (`delay * attempt`).
pub const DEFAULT_RETRY_DELAY_MS: u64 = 4_000;

/// Default timeout per HTTP call.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default batas menunggu hint `Retry-After`.
pub const DEFAULT_MAX_RETRY_AFTER_MS: u64 = 60_000;

// ════════════════════════════════════════════════════════════════════════════
// CONFIG ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Error saat membaca atau memvalidasi konfigurasi.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{key} invalid: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ════════════════════════════════════════════════════════════════════════════
// CACHE TTLS
// ════════════════════════════════════════════════════════════════════════════

/// TTL cache per endpoint, dipilih berdasarkan volatilitas data.
///
/// `0` berarti endpoint tidak di-cache.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheTtlConfig {
    pub system_info_ms: u64,
    pub blocks_ms: u64,
    pub transactions_pool_ms: u64,
    pub address_balance_ms: u64,
    pub utxo_balance_ms: u64,
    pub public_key_ms: u64,
    pub qr_proof_ms: u64,
    pub health_ms: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            system_info_ms: 30_000,
            blocks_ms: 30_000,
            transactions_pool_ms: 10_000,
            address_balance_ms: 60_000,
            utxo_balance_ms: 0,
            public_key_ms: 0,
            qr_proof_ms: 0,
            health_ms: 0,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// GATEWAY CONFIG
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL node upstream (tanpa trailing slash).
    pub base_url: String,

    /// Jumlah attempt maksimum per request (termasuk attempt pertama).
    pub max_retries: u32,

    /// Base delay backoff linear dalam milliseconds.
    pub base_retry_delay_ms: u64,

    /// Timeout per HTTP call dalam milliseconds.
    pub request_timeout_ms: u64,

    /// Sajikan cache stale saat attempt terakhir gagal.
    pub allow_stale_on_error: bool,

    /// Batas waktu sejak entry expired yang masih boleh disajikan sebagai
    /// stale. `None` = tanpa batas.
    pub max_stale_ms: Option<u64>,

    /// Hint `Retry-After` lebih besar dari ini tidak ditunggu.
    pub max_retry_after_ms: u64,

    /// TTL cache per endpoint.
    pub cache_ttl: CacheTtlConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_URL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            base_retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            allow_stale_on_error: true,
            max_stale_ms: None,
            max_retry_after_ms: DEFAULT_MAX_RETRY_AFTER_MS,
            cache_ttl: CacheTtlConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Config default dengan base URL tertentu.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Default + overlay environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Overlay nilai dari `lookup` (biasanya `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CHAINMAP_UPSTREAM_URL") {
            self.base_url = url;
        }
        if let Some(v) = parse_var(&lookup, "CHAINMAP_MAX_RETRIES")? {
            self.max_retries = v;
        }
        if let Some(v) = parse_var(&lookup, "CHAINMAP_RETRY_DELAY_MS")? {
            self.base_retry_delay_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "CHAINMAP_REQUEST_TIMEOUT_MS")? {
            self.request_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "CHAINMAP_ALLOW_STALE_ON_ERROR")? {
            self.allow_stale_on_error = v;
        }
        if let Some(v) = parse_var(&lookup, "CHAINMAP_MAX_STALE_MS")? {
            self.max_stale_ms = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "CHAINMAP_MAX_RETRY_AFTER_MS")? {
            self.max_retry_after_ms = v;
        }
        Ok(())
    }

    /// Validasi konfigurasi. Config yang buruk adalah hard failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be positive".to_string()));
        }
        let url = url::Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidValue {
            key: "base_url".to_string(),
            value: format!("{} ({})", self.base_url, e),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                key: "base_url".to_string(),
                value: self.base_url.clone(),
            });
        }
        Ok(())
    }

    /// Base URL tanpa trailing slash.
    pub fn normalized_base_url(&self) -> String {
        self.base_url.trim().trim_end_matches('/').to_string()
    }
}

/// Load config dari file TOML.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<GatewayConfig, ConfigError> {
    let s = fs::read_to_string(path.as_ref())?;
    let cfg: GatewayConfig = toml::from_str(&s)?;
    Ok(cfg)
}

/// Parse satu variable; variable yang ada tapi tidak valid adalah error.
pub fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
        None => Ok(None),
    }
}
