//! # Retrying Gateway Client
//!
//! HTTP client untuk SATU node upstream. Client ini menggabungkan
//! [`ResponseCache`] dan [`InflightRegistry`] untuk memutuskan apakah network
//! perlu dipanggil sama sekali, lalu menjalankan retry loop dengan backoff
//! linear dan kebijakan rate-limit.
//!
//! ## Alur `request()`
//!
//! 1. Resolve [`RequestSignature`] (cache key override, atau method+endpoint+body)
//! 2. Fresh cache hit → return langsung (`cacheHit: true, stale: false`)
//! 3. Ada eksekusi inflight untuk signature yang sama → await hasilnya
//! 4. Selain itu jadi leader dan jalankan retry loop:
//!    - 429 → stale cache diutamakan; selain itu tunggu `Retry-After` jika
//!      ada dan attempt masih tersisa; tanpa hint langsung gagal
//!    - non-2xx lain → error dengan status + potongan body (200 karakter)
//!    - network / parse error → retry; di attempt terakhir pakai stale cache
//!      jika `allow_stale_on_error`
//!    - sukses → simpan ke cache jika TTL > 0
//! 5. Registrasi inflight dilepas di semua exit path
//!
//! Semua kegagalan operasional di-resolve menjadi [`GatewayFailure`] value,
//! tidak pernah panic.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheEntry, CacheLookup, ResponseCache};
use crate::config::{ConfigError, GatewayConfig};
use crate::current_timestamp_ms;
use crate::inflight::InflightRegistry;
use crate::metrics::GatewayMetrics;
use crate::response::{GatewayFailure, GatewayResult, GatewaySuccess};
use crate::retry_after::retry_after_from_headers;
use crate::signature::{Method, RequestSignature};

/// Panjang maksimum potongan body error yang disimpan.
const ERROR_BODY_LIMIT: usize = 200;

// ════════════════════════════════════════════════════════════════════════════
// ATTEMPT ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Klasifikasi kegagalan satu attempt HTTP.
#[derive(Debug, Clone, Error)]
pub enum AttemptError {
    #[error("rate limited by upstream (HTTP 429)")]
    RateLimited { retry_after: Option<Duration> },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Transport(String),

    #[error("invalid JSON response: {0}")]
    Parse(String),
}

impl AttemptError {
    /// 5xx, 408, network dan parse error boleh di-retry. 4xx lain tidak.
    pub fn is_retryable(&self) -> bool {
        match self {
            AttemptError::RateLimited { .. } => false,
            AttemptError::Status { status, .. } => *status >= 500 || *status == 408,
            AttemptError::Transport(_) | AttemptError::Parse(_) => true,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AttemptError::RateLimited { .. } => Some(429),
            AttemptError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// REQUEST OPTIONS
// ════════════════════════════════════════════════════════════════════════════

/// Opsi per request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    /// Override signature untuk cache dan dedup.
    pub cache_key: Option<String>,
    /// `0` = tidak di-cache.
    pub cache_ttl_ms: u64,
    /// `None` = pakai `GatewayConfig::allow_stale_on_error`.
    pub allow_stale_on_error: Option<bool>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self {
            method: Method::Get,
            body: None,
            cache_key: None,
            cache_ttl_ms: 0,
            allow_stale_on_error: None,
        }
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
            ..Self::get()
        }
    }

    pub fn cache_ttl(mut self, ttl_ms: u64) -> Self {
        self.cache_ttl_ms = ttl_ms;
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn allow_stale_on_error(mut self, allow: bool) -> Self {
        self.allow_stale_on_error = Some(allow);
        self
    }
}

// ════════════════════════════════════════════════════════════════════════════
// CLIENT
// ════════════════════════════════════════════════════════════════════════════

/// Gateway client; murah untuk di-clone, semua state dibagi lewat `Arc`.
#[derive(Clone, Debug)]
pub struct RetryingGatewayClient(pub Arc<ClientWrapper>);

#[derive(Debug)]
pub struct ClientWrapper {
    pub base: String,
    pub client: Client,
    pub config: GatewayConfig,
    cache: ResponseCache<GatewaySuccess>,
    inflight: Arc<InflightRegistry<GatewayResult>>,
    metrics: GatewayMetrics,
}

impl RetryingGatewayClient {
    /// Bangun client dari config yang sudah divalidasi.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("http client: {}", e)))?;

        Ok(Self(Arc::new(ClientWrapper {
            base: config.normalized_base_url(),
            client,
            config,
            cache: ResponseCache::new(),
            inflight: Arc::new(InflightRegistry::new()),
            metrics: GatewayMetrics::new(),
        })))
    }

    pub fn base_url(&self) -> &str {
        &self.0.base
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.0.config
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.0.metrics
    }

    /// Jumlah eksekusi yang sedang inflight.
    pub fn inflight_len(&self) -> usize {
        self.0.inflight.len()
    }

    /// Jumlah entry cache (fresh maupun stale).
    pub fn cache_len(&self) -> usize {
        self.0.cache.len()
    }

    /// Hapus seluruh cache response.
    pub fn clear_cache(&self) {
        self.0.cache.clear();
        info!(base = %self.0.base, "gateway cache cleared");
    }

    /// Generic request ke `endpoint` (path relatif terhadap base URL).
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> GatewayResult {
        let inner = &self.0;
        inner.metrics.requests_total.inc();

        let signature = RequestSignature::resolve(
            options.cache_key.as_deref(),
            options.method,
            endpoint,
            options.body.as_ref(),
        );

        if let CacheLookup::Fresh(entry) = inner.cache.lookup(&signature) {
            inner.metrics.cache_fresh_hits.inc();
            debug!(endpoint, "fresh cache hit");
            return Ok(entry.value.into_cache_hit(false, None));
        }
        inner.metrics.cache_misses.inc();

        let leader = Arc::clone(inner);
        let task_endpoint = endpoint.to_string();
        let task_signature = signature.clone();
        let failure_endpoint = endpoint.to_string();

        let joined = inner.inflight.join_or_spawn(
            &signature,
            async move {
                leader
                    .execute(&task_endpoint, &task_signature, options)
                    .await
            },
            move |reason| {
                Err(GatewayFailure::new(
                    format!("request task failed: {}", reason),
                    failure_endpoint,
                    None,
                ))
            },
        );

        if !joined.is_leader() {
            inner.metrics.dedup_joins.inc();
            debug!(endpoint, "joined inflight request");
        }

        joined.into_shared().await
    }

    // ────────────────────────────────────────────────────────────────────────
    // Operations
    // ────────────────────────────────────────────────────────────────────────

    pub async fn get_system_info(&self) -> GatewayResult {
        let ttl = self.0.config.cache_ttl.system_info_ms;
        self.request("/system-info", RequestOptions::get().cache_ttl(ttl)).await
    }

    pub async fn get_blocks(&self) -> GatewayResult {
        let ttl = self.0.config.cache_ttl.blocks_ms;
        self.request("/blocks", RequestOptions::get().cache_ttl(ttl)).await
    }

    pub async fn get_transactions_pool(&self) -> GatewayResult {
        let ttl = self.0.config.cache_ttl.transactions_pool_ms;
        self.request("/transactionsPool", RequestOptions::get().cache_ttl(ttl)).await
    }

    pub async fn get_address_balance(&self, address: &str) -> GatewayResult {
        let ttl = self.0.config.cache_ttl.address_balance_ms;
        let options = RequestOptions::post(json!({ "address": address })).cache_ttl(ttl);
        self.request("/address-balance", options).await
    }

    pub async fn get_utxo_balance(&self, address: &str) -> GatewayResult {
        let ttl = self.0.config.cache_ttl.utxo_balance_ms;
        let endpoint = format!("/utxo-balance/{}", encode_path_segment(address));
        self.request(&endpoint, RequestOptions::get().cache_ttl(ttl)).await
    }

    pub async fn get_public_key(&self) -> GatewayResult {
        let ttl = self.0.config.cache_ttl.public_key_ms;
        self.request("/public-key", RequestOptions::get().cache_ttl(ttl)).await
    }

    pub async fn verify_qr_proof(&self, qr_data: Value) -> GatewayResult {
        let ttl = self.0.config.cache_ttl.qr_proof_ms;
        let options = RequestOptions::post(json!({ "qrData": qr_data })).cache_ttl(ttl);
        self.request("/verify-qr-proof", options).await
    }

    /// Probe ringan ke upstream lewat `/balance`.
    pub async fn check_health(&self) -> GatewayResult {
        let ttl = self.0.config.cache_ttl.health_ms;
        self.request("/balance", RequestOptions::get().cache_ttl(ttl)).await
    }
}

impl ClientWrapper {
    /// Retry loop untuk satu signature. Hanya dijalankan oleh leader.
    async fn execute(
        &self,
        endpoint: &str,
        signature: &RequestSignature,
        options: RequestOptions,
    ) -> GatewayResult {
        // leader sebelumnya bisa saja baru selesai mengisi cache
        if let CacheLookup::Fresh(entry) = self.cache.lookup(signature) {
            self.metrics.cache_fresh_hits.inc();
            return Ok(entry.value.into_cache_hit(false, None));
        }

        let max_attempts = self.config.max_retries.max(1);
        let allow_stale = options
            .allow_stale_on_error
            .unwrap_or(self.config.allow_stale_on_error);
        let url = format!("{}{}", self.base, endpoint);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let is_final = attempt >= max_attempts;
            self.metrics.network_calls_total.inc();

            let err = match self.send_once(&url, &options).await {
                Ok(data) => {
                    let success = GatewaySuccess::fresh(data);
                    if self
                        .cache
                        .set(signature.clone(), success.clone(), options.cache_ttl_ms)
                    {
                        debug!(endpoint, ttl_ms = options.cache_ttl_ms, "response cached");
                    }
                    return Ok(success);
                }
                Err(err) => err,
            };

            if let AttemptError::RateLimited { retry_after } = &err {
                self.metrics.rate_limited_total.inc();

                if let Some(entry) = self.stale_entry(signature) {
                    warn!(endpoint, attempt, "rate limited, serving stale cache");
                    self.metrics.cache_stale_hits.inc();
                    let warning = "Upstream rate limited; serving cached data".to_string();
                    return Ok(entry.value.into_cache_hit(true, Some(warning)));
                }

                let max_wait = Duration::from_millis(self.config.max_retry_after_ms);
                match retry_after {
                    Some(wait) if !is_final && *wait <= max_wait => {
                        info!(
                            endpoint,
                            attempt,
                            wait_ms = wait.as_millis() as u64,
                            "rate limited, honoring Retry-After"
                        );
                        self.metrics.retries_total.inc();
                        tokio::time::sleep(*wait).await;
                        continue;
                    }
                    _ => return self.fail(endpoint, attempt, &err),
                }
            }

            warn!(endpoint, attempt, error = %err, "upstream attempt failed");

            if is_final || !err.is_retryable() {
                if allow_stale {
                    if let Some(entry) = self.stale_entry(signature) {
                        self.metrics.cache_stale_hits.inc();
                        let warning = format!("Upstream unavailable ({}); serving cached data", err);
                        return Ok(entry.value.into_cache_hit(true, Some(warning)));
                    }
                }
                return self.fail(endpoint, attempt, &err);
            }

            self.metrics.retries_total.inc();
            let delay = self
                .config
                .base_retry_delay_ms
                .saturating_mul(u64::from(attempt));
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// Satu HTTP call. Body sukses wajib JSON.
    async fn send_once(&self, url: &str, options: &RequestOptions) -> Result<Value, AttemptError> {
        let mut req = self
            .client
            .request(options.method.into(), url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = &options.body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::RateLimited {
                retry_after: retry_after_from_headers(resp.headers()),
            });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AttemptError::Status {
                status: status.as_u16(),
                body: truncate_chars(&body, ERROR_BODY_LIMIT),
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| AttemptError::Parse(e.to_string()))
    }

    /// Entry cache yang masih boleh disajikan sebagai stale.
    fn stale_entry(&self, signature: &RequestSignature) -> Option<CacheEntry<GatewaySuccess>> {
        let entry = self.cache.get(signature)?;
        if let Some(max_stale) = self.config.max_stale_ms {
            let stale_for = current_timestamp_ms().saturating_sub(entry.expires_at);
            if stale_for > max_stale {
                debug!(signature = %signature, stale_for, "cached entry too stale to serve");
                return None;
            }
        }
        Some(entry)
    }

    fn fail(&self, endpoint: &str, attempt: u32, err: &AttemptError) -> GatewayResult {
        self.metrics.failures_total.inc();
        error!(endpoint, attempt, error = %err, "gateway request failed");
        Err(GatewayFailure::new(err.to_string(), endpoint, err.status()))
    }
}

/// Potong string ke maksimum `limit` karakter (bukan byte).
fn truncate_chars(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

/// Encode satu path segment (spasi → `%20`).
pub fn encode_path_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
