//! # HTTP API
//!
//! Router axum yang mengekspos gateway dan aggregator ke dashboard.
//!
//! ## Endpoints
//! - GET  /api/network                  - view network ter-agregasi + koordinat
//! - GET  /api/system-info              - system info node upstream
//! - GET  /api/blocks                   - daftar block
//! - GET  /api/transactions-pool        - transaction pool
//! - GET  /api/public-key               - public key node
//! - GET  /api/utxo-balance/:address    - UTXO balance
//! - POST /api/address-balance          - `{address}`
//! - POST /api/verify-qr-proof          - `{qrData}`
//! - POST /api/cache/clear              - kosongkan cache gateway
//! - GET  /health                       - status upstream
//! - GET  /metrics                      - Prometheus metrics
//!
//! Hasil gateway `success:false` dikembalikan dengan HTTP 502.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chainmap_gateway::response::to_json;
use chainmap_gateway::{ConfigError, GatewayResult, RetryingGatewayClient};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::aggregator::PeerFanoutAggregator;
use crate::config::IngressConfig;
use crate::geo::{CoordinateEnricher, StaticGeoEnricher};
use crate::metrics::IngressMetrics;

// ════════════════════════════════════════════════════════════════════════════
// APP STATE
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct AppState {
    pub gateway: RetryingGatewayClient,
    pub aggregator: Arc<PeerFanoutAggregator>,
    pub enricher: Arc<dyn CoordinateEnricher>,
    pub metrics: Arc<IngressMetrics>,
}

impl AppState {
    /// Bangun seluruh komponen dari config.
    pub fn from_config(config: &IngressConfig) -> Result<Self, ConfigError> {
        let gateway = RetryingGatewayClient::new(config.gateway.clone())?;
        let enricher: Arc<dyn CoordinateEnricher> = Arc::new(StaticGeoEnricher::new(config.geo.clone()));
        Self::with_enricher(gateway, config, enricher)
    }

    /// Seperti [`from_config`](Self::from_config) dengan gateway dan enricher eksplisit.
    pub fn with_enricher(
        gateway: RetryingGatewayClient,
        config: &IngressConfig,
        enricher: Arc<dyn CoordinateEnricher>,
    ) -> Result<Self, ConfigError> {
        let metrics = Arc::new(IngressMetrics::new());
        let aggregator = PeerFanoutAggregator::new(
            gateway.clone(),
            config.probe_timeout(),
            Arc::clone(&metrics),
        )?;

        Ok(Self {
            gateway,
            aggregator: Arc::new(aggregator),
            enricher,
            metrics,
        })
    }
}

/// Router lengkap dengan state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/network", get(network_view))
        .route("/api/system-info", get(system_info))
        .route("/api/blocks", get(blocks))
        .route("/api/transactions-pool", get(transactions_pool))
        .route("/api/public-key", get(public_key))
        .route("/api/utxo-balance/:address", get(utxo_balance))
        .route("/api/address-balance", post(address_balance))
        .route("/api/verify-qr-proof", post(verify_qr_proof))
        .route("/api/cache/clear", post(clear_cache))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
}

// ════════════════════════════════════════════════════════════════════════════
// HELPERS
// ════════════════════════════════════════════════════════════════════════════

fn respond(state: &AppState, status: StatusCode, body: Value) -> Response {
    state.metrics.record_request(status.as_u16());
    (status, Json(body)).into_response()
}

/// Render hasil gateway; `success:false` → 502.
fn gateway_response(state: &AppState, result: GatewayResult) -> Response {
    let status = if result.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    respond(state, status, to_json(&result))
}

fn bad_request(state: &AppState, message: &str) -> Response {
    respond(
        state,
        StatusCode::BAD_REQUEST,
        json!({ "success": false, "error": message, "timestamp": Utc::now() }),
    )
}

// ════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ════════════════════════════════════════════════════════════════════════════

/// GET /api/network
#[instrument(skip(state))]
async fn network_view(State(state): State<AppState>) -> Response {
    match state.aggregator.build_network_view().await {
        Ok(mut view) => {
            view.peers = state.enricher.enrich(view.peers).await;
            match serde_json::to_value(&view) {
                Ok(body) => respond(&state, StatusCode::OK, body),
                Err(e) => respond(
                    &state,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "success": false, "error": e.to_string(), "timestamp": Utc::now() }),
                ),
            }
        }
        Err(e) => {
            warn!(error = %e, "network view unavailable");
            respond(
                &state,
                StatusCode::BAD_GATEWAY,
                json!({ "success": false, "error": e.to_string(), "timestamp": Utc::now() }),
            )
        }
    }
}

#[instrument(skip(state))]
async fn system_info(State(state): State<AppState>) -> Response {
    let result = state.gateway.get_system_info().await;
    gateway_response(&state, result)
}

#[instrument(skip(state))]
async fn blocks(State(state): State<AppState>) -> Response {
    let result = state.gateway.get_blocks().await;
    gateway_response(&state, result)
}

#[instrument(skip(state))]
async fn transactions_pool(State(state): State<AppState>) -> Response {
    let result = state.gateway.get_transactions_pool().await;
    gateway_response(&state, result)
}

#[instrument(skip(state))]
async fn public_key(State(state): State<AppState>) -> Response {
    let result = state.gateway.get_public_key().await;
    gateway_response(&state, result)
}

#[instrument(skip(state))]
async fn utxo_balance(State(state): State<AppState>, Path(address): Path<String>) -> Response {
    if address.trim().is_empty() {
        return bad_request(&state, "address is required");
    }
    let result = state.gateway.get_utxo_balance(address.trim()).await;
    gateway_response(&state, result)
}

#[derive(Debug, Deserialize)]
struct AddressBody {
    #[serde(default)]
    address: String,
}

#[instrument(skip(state, body))]
async fn address_balance(State(state): State<AppState>, Json(body): Json<AddressBody>) -> Response {
    let address = body.address.trim();
    if address.is_empty() {
        return bad_request(&state, "address is required");
    }
    let result = state.gateway.get_address_balance(address).await;
    gateway_response(&state, result)
}

#[derive(Debug, Deserialize)]
struct QrProofBody {
    #[serde(rename = "qrData", default)]
    qr_data: Value,
}

#[instrument(skip(state, body))]
async fn verify_qr_proof(State(state): State<AppState>, Json(body): Json<QrProofBody>) -> Response {
    if body.qr_data.is_null() {
        return bad_request(&state, "qrData is required");
    }
    let result = state.gateway.verify_qr_proof(body.qr_data).await;
    gateway_response(&state, result)
}

/// POST /api/cache/clear
#[instrument(skip(state))]
async fn clear_cache(State(state): State<AppState>) -> Response {
    let cleared = state.gateway.cache_len();
    state.gateway.clear_cache();
    info!(cleared, "cache cleared via API");
    respond(&state, StatusCode::OK, json!({ "success": true, "cleared": cleared }))
}

/// GET /health - status upstream lewat `check_health`
async fn health(State(state): State<AppState>) -> Response {
    let result = state.gateway.check_health().await;
    let healthy = result.is_ok();
    let label = if healthy { "healthy" } else { "unhealthy" };
    let body = json!({
        "status": label,
        "upstream": state.gateway.base_url(),
        "inflight": state.gateway.inflight_len(),
        "cachedEntries": state.gateway.cache_len(),
        "check": to_json(&result),
    });
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    respond(&state, status, body)
}

/// GET /metrics - Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let output = state.metrics.to_prometheus(state.gateway.metrics());
    let mut headers = HeaderMap::new();
    headers.insert(
        "content-type",
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    (StatusCode::OK, headers, output)
}
