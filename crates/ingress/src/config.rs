//! Konfigurasi ingress: listen address, probe peer, geolokasi, dan gateway.
//!
//! Urutan sumber:
//! 1. Default
//! 2. File TOML dari `CHAINMAP_CONFIG` (jika di-set)
//! 3. Environment variables (override)
//!
//! Contoh file:
//!
//! ```toml
//! listen_addr = "0.0.0.0:8088"
//! probe_timeout_ms = 5000
//!
//! [gateway]
//! base_url = "http://127.0.0.1:3001"
//! max_retries = 3
//!
//! [geo.default_location]
//! lat = 0.0
//! lng = 0.0
//! city = "Unknown"
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use chainmap_gateway::config::parse_var;
use chainmap_gateway::{ConfigError, GatewayConfig};
use serde::Deserialize;

use crate::aggregator::DEFAULT_PROBE_TIMEOUT_MS;
use crate::geo::GeoConfig;

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8088";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    pub listen_addr: String,
    /// Timeout per probe peer dalam milliseconds.
    pub probe_timeout_ms: u64,
    pub geo: GeoConfig,
    pub gateway: GatewayConfig,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            geo: GeoConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl IngressConfig {
    /// Load config: file dari `CHAINMAP_CONFIG` jika ada, lalu overlay env.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Seperti [`load`](Self::load) dengan sumber variable eksplisit.
    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match lookup("CHAINMAP_CONFIG") {
            Some(path) => load_from_file(path)?,
            None => Self::default(),
        };
        cfg.apply_env(&lookup)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("CHAINMAP_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(v) = parse_var(lookup, "CHAINMAP_PROBE_TIMEOUT_MS")? {
            self.probe_timeout_ms = v;
        }
        self.gateway.apply_env(lookup)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::Invalid("probe_timeout_ms must be positive".to_string()));
        }
        self.gateway.validate()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: "listen_addr".to_string(),
                value: self.listen_addr.clone(),
            })
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Load config dari file TOML.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<IngressConfig, ConfigError> {
    let s = fs::read_to_string(path.as_ref())?;
    let cfg: IngressConfig = toml::from_str(&s)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: Vec<(&str, String)>) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let cfg = IngressConfig::default();
        assert_eq!(cfg.probe_timeout_ms, 5_000);
        assert_eq!(cfg.listen_addr, DEFAULT_LISTEN_ADDR);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_load_file_then_env_overlay() {
        let tmp = tempfile::NamedTempFile::new().expect("temp file");
        let toml = r#"
            listen_addr = "0.0.0.0:9000"
            probe_timeout_ms = 2500

            [gateway]
            base_url = "http://node-a:3001"
            max_retries = 2

            [geo.default_location]
            lat = -6.2
            lng = 106.8
            city = "Jakarta"
        "#;
        let mut f = tmp.reopen().expect("reopen");
        write!(f, "{}", toml).expect("write");

        let path = tmp.path().to_string_lossy().to_string();
        let cfg = IngressConfig::load_with(lookup_from(vec![
            ("CHAINMAP_CONFIG", path),
            ("CHAINMAP_MAX_RETRIES", "5".to_string()),
        ]))
        .expect("load");

        assert_eq!(cfg.listen_addr, "0.0.0.0:9000");
        assert_eq!(cfg.probe_timeout_ms, 2_500);
        assert_eq!(cfg.gateway.base_url, "http://node-a:3001");
        // env menang atas file
        assert_eq!(cfg.gateway.max_retries, 5);
        assert_eq!(cfg.geo.default_location.city, "Jakarta");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = IngressConfig::load_with(lookup_from(vec![(
            "CHAINMAP_PROBE_TIMEOUT_MS",
            "0".to_string(),
        )]));
        assert!(err.is_err());

        let err = IngressConfig::load_with(lookup_from(vec![(
            "CHAINMAP_LISTEN_ADDR",
            "not-an-addr".to_string(),
        )]));
        assert!(err.is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = IngressConfig::load_with(lookup_from(vec![(
            "CHAINMAP_CONFIG",
            "/nonexistent/chainmap.toml".to_string(),
        )]));
        assert!(matches!(err, Err(ConfigError::Io(_))));
    }
}
