//! # Coordinate Enrichment
//!
//! Seam ke layanan geolokasi: menerima daftar [`PeerRecord`] dan
//! mengembalikan daftar yang sama dengan `lat`/`lng`/`city` terisi.
//!
//! ## Contract
//!
//! - Jumlah dan urutan record tidak berubah
//! - Record tanpa alamat yang bisa digeolokasi tetap diteruskan, memakai
//!   lokasi default
//! - Record yang sudah punya koordinat tidak ditimpa

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::peer::PeerRecord;

/// Satu titik lokasi.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lng: f64,
    pub city: String,
}

impl Default for GeoLocation {
    fn default() -> Self {
        Self {
            lat: 0.0,
            lng: 0.0,
            city: "Unknown".to_string(),
        }
    }
}

/// Konfigurasi enricher statis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Lokasi untuk record yang host-nya tidak dikenal.
    pub default_location: GeoLocation,
    /// Lokasi per hostname.
    pub hosts: HashMap<String, GeoLocation>,
}

/// Pemberi koordinat untuk record peer.
#[async_trait]
pub trait CoordinateEnricher: Send + Sync {
    async fn enrich(&self, peers: Vec<PeerRecord>) -> Vec<PeerRecord>;
}

/// Enricher berbasis tabel hostname → lokasi, dengan fallback default.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoEnricher {
    config: GeoConfig,
}

impl StaticGeoEnricher {
    /// Key `hosts` dinormalisasi ke lowercase, sama seperti host yang dicari.
    pub fn new(mut config: GeoConfig) -> Self {
        config.hosts = config
            .hosts
            .into_iter()
            .map(|(host, loc)| (host.trim().to_ascii_lowercase(), loc))
            .collect();
        Self { config }
    }

    /// Lokasi untuk satu url.
    pub fn locate(&self, http_url: &str) -> &GeoLocation {
        Url::parse(http_url.trim())
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .and_then(|host| self.config.hosts.get(&host))
            .unwrap_or(&self.config.default_location)
    }
}

#[async_trait]
impl CoordinateEnricher for StaticGeoEnricher {
    async fn enrich(&self, peers: Vec<PeerRecord>) -> Vec<PeerRecord> {
        peers
            .into_iter()
            .map(|mut peer| {
                if !peer.has_location() {
                    let loc = self.locate(&peer.http_url);
                    peer.lat = Some(loc.lat);
                    peer.lng = Some(loc.lng);
                    peer.city = Some(loc.city.clone());
                }
                peer
            })
            .collect()
    }
}
