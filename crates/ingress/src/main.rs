//! # chainmap-ingress
//!
//! Binary HTTP untuk dashboard peta network.
//!
//! Konfigurasi lewat file TOML (`CHAINMAP_CONFIG`) dan environment variables;
//! lihat `chainmap_ingress::config`. Level log dari `CHAINMAP_LOG_LEVEL`
//! (default: `info`).

use std::str::FromStr;

use anyhow::{Context, Result};
use chainmap_ingress::{router, AppState, IngressConfig};
use tracing::{error, info};

fn log_level_from_env() -> tracing::Level {
    std::env::var("CHAINMAP_LOG_LEVEL")
        .ok()
        .and_then(|s| tracing::Level::from_str(s.trim()).ok())
        .unwrap_or(tracing::Level::INFO)
}

// ════════════════════════════════════════════════════════════════════════════
// MAIN
// ════════════════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(log_level_from_env())
        .init();

    let config = IngressConfig::load().context("invalid configuration")?;
    let addr = config.socket_addr()?;
    info!(
        upstream = %config.gateway.base_url,
        max_retries = config.gateway.max_retries,
        probe_timeout_ms = config.probe_timeout_ms,
        "ingress starting"
    );

    let state = AppState::from_config(&config).context("failed to build app state")?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    info!(listen_addr = %addr, "Ingress listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
    });

    if let Err(e) = server.await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Ingress shutdown complete");
    Ok(())
}
