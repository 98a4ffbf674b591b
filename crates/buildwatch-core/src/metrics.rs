//! Global atomic counters for buildwatch.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. once per refresh cycle).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    status_fetches: AtomicU64,
    cache_hits: AtomicU64,
    walks_completed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            status_fetches: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            walks_completed: AtomicU64::new(0),
        }
    }

    /// A status record was requested from the tracker.
    pub fn inc_status_fetches(&self) {
        self.status_fetches.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "status_fetches", "counter incremented");
    }

    /// A status record was served from the resolver cache.
    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_hits", "counter incremented");
    }

    pub fn inc_walks(&self) {
        self.walks_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "walks_completed", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            status_fetches = self.status_fetches(),
            cache_hits = self.cache_hits(),
            walks_completed = self.walks_completed(),
        );
    }

    pub fn status_fetches(&self) -> u64 {
        self.status_fetches.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn walks_completed(&self) -> u64 {
        self.walks_completed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.status_fetches.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.walks_completed.store(0, Ordering::Relaxed);
    }
}
