//! # Response Cache
//!
//! Time-boxed key → value store untuk response upstream yang sukses.
//!
//! ## Prinsip
//!
//! - Cache hanya untuk performa dan ketersediaan, BUKAN sumber kebenaran
//! - Entry yang expired TIDAK dihapus: entry tersebut masih bisa disajikan
//!   sebagai "stale" saat upstream rate-limited atau gagal
//! - Entry hanya hilang lewat `clear()` atau overwrite oleh response berikutnya
//!
//! ## Invariant
//!
//! - Entry dengan `ttl_ms == 0` tidak pernah disimpan (caching opt-in per endpoint)
//! - `expires_at = created_at + ttl_ms`
//! - `get()` tidak punya side effect

use std::collections::HashMap;
use std::fmt::{self, Debug};

use parking_lot::RwLock;

use crate::current_timestamp_ms;
use crate::signature::RequestSignature;

// ════════════════════════════════════════════════════════════════════════════
// CACHE ENTRY
// ════════════════════════════════════════════════════════════════════════════

/// Satu entry cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    /// Payload sukses (opaque bagi cache).
    pub value: V,
    /// Waktu entry dibuat (Unix milliseconds).
    pub created_at: u64,
    /// Waktu entry expired (Unix milliseconds).
    pub expires_at: u64,
}

impl<V> CacheEntry<V> {
    /// Fresh jika `expires_at > now`.
    pub fn is_fresh_at(&self, now: u64) -> bool {
        self.expires_at > now
    }

    /// Umur entry dalam milliseconds.
    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }
}

/// Hasil lookup cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<V> {
    /// Entry ada dan belum expired.
    Fresh(CacheEntry<V>),
    /// Entry ada tapi sudah lewat TTL.
    Stale(CacheEntry<V>),
    /// Tidak ada entry.
    Miss,
}

// ════════════════════════════════════════════════════════════════════════════
// RESPONSE CACHE
// ════════════════════════════════════════════════════════════════════════════

/// Thread-safe response cache, keyed by [`RequestSignature`].
pub struct ResponseCache<V> {
    entries: RwLock<HashMap<RequestSignature, CacheEntry<V>>>,
}

impl<V> Default for ResponseCache<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> Debug for ResponseCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

impl<V: Clone> ResponseCache<V> {
    /// Membuat cache kosong.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ambil entry (fresh maupun stale). Tidak ada side effect.
    pub fn get(&self, signature: &RequestSignature) -> Option<CacheEntry<V>> {
        self.entries.read().get(signature).cloned()
    }

    /// Simpan value dengan TTL. Return `false` jika `ttl_ms == 0` (tidak disimpan).
    pub fn set(&self, signature: RequestSignature, value: V, ttl_ms: u64) -> bool {
        self.set_at(signature, value, ttl_ms, current_timestamp_ms())
    }

    /// Seperti [`set`](Self::set) dengan timestamp eksplisit.
    pub fn set_at(&self, signature: RequestSignature, value: V, ttl_ms: u64, now: u64) -> bool {
        if ttl_ms == 0 {
            return false;
        }

        let entry = CacheEntry {
            value,
            created_at: now,
            expires_at: now.saturating_add(ttl_ms),
        };
        self.entries.write().insert(signature, entry);
        true
    }

    /// Hapus semua entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Check freshness terhadap waktu sekarang.
    pub fn is_fresh(entry: &CacheEntry<V>) -> bool {
        entry.is_fresh_at(current_timestamp_ms())
    }

    /// Lookup dengan klasifikasi fresh / stale / miss.
    pub fn lookup(&self, signature: &RequestSignature) -> CacheLookup<V> {
        self.lookup_at(signature, current_timestamp_ms())
    }

    /// Lookup dengan timestamp eksplisit.
    pub fn lookup_at(&self, signature: &RequestSignature, now: u64) -> CacheLookup<V> {
        match self.get(signature) {
            Some(entry) if entry.is_fresh_at(now) => CacheLookup::Fresh(entry),
            Some(entry) => CacheLookup::Stale(entry),
            None => CacheLookup::Miss,
        }
    }

    /// Jumlah entry (termasuk stale).
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════
