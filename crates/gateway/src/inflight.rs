//! # Inflight Registry
//!
//! Registry untuk request outbound yang sedang berjalan, keyed by
//! [`RequestSignature`]. N caller konkuren dengan signature identik
//! di-collapse menjadi SATU eksekusi; N-1 follower menerima hasil settled
//! yang sama persis dengan leader (sukses maupun gagal).
//!
//! ## Register / Release Discipline
//!
//! - Hanya satu registrasi per signature pada satu waktu
//! - Eksekusi berjalan di task tokio terpisah, dan task tersebut memegang
//!   [`InflightGuard`]; guard melepas registrasi saat di-drop
//! - Dengan begitu release terjadi di SEMUA exit path: sukses, error,
//!   panic, maupun semua caller membatalkan await-nya
//!
//! Release selalu terjadi sebelum hasil terlihat oleh caller, karena guard
//! di-drop di akhir task sebelum `JoinHandle` selesai.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::signature::RequestSignature;

/// Hasil eksekusi yang bisa di-await oleh banyak caller.
pub type SharedResult<T> = Shared<BoxFuture<'static, T>>;

/// Posisi caller terhadap eksekusi inflight.
pub enum Joined<T: Clone> {
    /// Caller ini yang memulai eksekusi.
    Leader(SharedResult<T>),
    /// Caller ini bergabung ke eksekusi yang sudah berjalan.
    Follower(SharedResult<T>),
}

impl<T: Clone> Joined<T> {
    pub fn is_leader(&self) -> bool {
        matches!(self, Joined::Leader(_))
    }

    pub fn into_shared(self) -> SharedResult<T> {
        match self {
            Joined::Leader(s) | Joined::Follower(s) => s,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ════════════════════════════════════════════════════════════════════════════

/// Map signature → eksekusi yang sedang berjalan.
pub struct InflightRegistry<T: Clone> {
    entries: Mutex<HashMap<RequestSignature, SharedResult<T>>>,
}

impl<T: Clone> Default for InflightRegistry<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> Debug for InflightRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InflightRegistry")
            .field("inflight", &self.entries.lock().len())
            .finish()
    }
}

impl<T> InflightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Ambil eksekusi yang sedang berjalan untuk signature.
    pub fn get(&self, signature: &RequestSignature) -> Option<SharedResult<T>> {
        self.entries.lock().get(signature).cloned()
    }

    /// Daftarkan eksekusi. Caller wajib memastikan belum ada registrasi.
    pub fn register(&self, signature: RequestSignature, task: SharedResult<T>) {
        let previous = self.entries.lock().insert(signature, task);
        debug_assert!(previous.is_none(), "duplicate inflight registration");
    }

    /// Lepas registrasi tanpa syarat. Return `true` jika ada entry yang dihapus.
    pub fn release(&self, signature: &RequestSignature) -> bool {
        self.entries.lock().remove(signature).is_some()
    }

    /// Get-or-register secara atomik di bawah satu lock.
    ///
    /// `make` hanya dipanggil jika belum ada eksekusi untuk signature ini.
    pub fn join_or_register<F>(&self, signature: &RequestSignature, make: F) -> Joined<T>
    where
        F: FnOnce() -> SharedResult<T>,
    {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(signature) {
            return Joined::Follower(existing.clone());
        }

        let task = make();
        entries.insert(signature.clone(), task.clone());
        Joined::Leader(task)
    }

    /// Jalankan `fut` sebagai eksekusi tunggal untuk signature, atau gabung
    /// ke eksekusi yang sudah berjalan.
    ///
    /// `fut` di-spawn ke runtime tokio dan memegang [`InflightGuard`].
    /// Jika task gagal di level runtime (panic / abort), `on_task_failure`
    /// membentuk hasil yang diterima semua caller.
    pub fn join_or_spawn<Fut, E>(
        self: &Arc<Self>,
        signature: &RequestSignature,
        fut: Fut,
        on_task_failure: E,
    ) -> Joined<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        E: FnOnce(String) -> T + Send + 'static,
    {
        self.join_or_register(signature, || {
            let guard = InflightGuard::new(Arc::clone(self), signature.clone());
            let handle = tokio::spawn(async move {
                let _guard = guard;
                fut.await
            });

            async move {
                match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        error!(error = %e, "inflight task failed");
                        on_task_failure(e.to_string())
                    }
                }
            }
            .boxed()
            .shared()
        })
    }

    /// Jumlah eksekusi yang sedang berjalan.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// GUARD
// ════════════════════════════════════════════════════════════════════════════

/// Melepas registrasi inflight saat di-drop.
pub struct InflightGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    registry: Arc<InflightRegistry<T>>,
    signature: RequestSignature,
}

impl<T> InflightGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(registry: Arc<InflightRegistry<T>>, signature: RequestSignature) -> Self {
        Self { registry, signature }
    }
}

impl<T> Drop for InflightGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.registry.release(&self.signature) {
            debug!(signature = %self.signature, "inflight released");
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════
