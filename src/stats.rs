//! Hit/miss counters and occupancy figures.
//!
//! Counters live in memory only and are not persisted. `hit_rate` is derived
//! on every snapshot rather than stored. Per-tier usage is recomputed by the
//! cleanup sweep from live entries instead of being tracked incrementally.

use crate::backend::BackendId;
use crate::entry::Timestamp;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live entries and bytes in one tier, as of the last cleanup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackendUsage {
    pub entries: usize,
    pub size_bytes: u64,
}

/// Point-in-time view of the statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: u64,
    pub total_size_bytes: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    /// hits / (hits + misses), 0.0 before the first lookup.
    pub hit_rate: f64,
    pub eviction_count: u64,
    pub expired_count: u64,
    pub backend_usage: BTreeMap<BackendId, BackendUsage>,
    /// Microseconds since the epoch; `None` until the first sweep.
    pub last_cleanup: Option<Timestamp>,
}

/// Shared running counters, owned by the manager.
#[derive(Default)]
pub struct StatsTracker {
    hits: AtomicU64,
    misses: AtomicU64,
    total_entries: AtomicU64,
    total_size_bytes: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    // 0 = never
    last_cleanup: AtomicU64,
    usage: DashMap<BackendId, BackendUsage>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// One logical `set`, however many tiers it reached.
    pub fn record_set(&self, size_bytes: u64) {
        self.total_entries.fetch_add(1, Ordering::Relaxed);
        self.total_size_bytes
            .fetch_add(size_bytes, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: usize) {
        self.expirations.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn set_backend_usage(&self, backend: BackendId, usage: BackendUsage) {
        self.usage.insert(backend, usage);
    }

    pub fn mark_cleanup(&self, at: Timestamp) {
        self.last_cleanup.store(at, Ordering::Relaxed);
    }

    /// Zero entry/size totals; hit/miss history is kept.
    pub fn reset_totals(&self, cleared: &[BackendId]) {
        self.total_entries.store(0, Ordering::Relaxed);
        self.total_size_bytes.store(0, Ordering::Relaxed);
        for backend in cleared {
            self.usage.insert(*backend, BackendUsage::default());
        }
    }

    /// Zero hit/miss/eviction/expiry counters.
    pub fn reset_counters(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        let hit_count = self.hits.load(Ordering::Relaxed);
        let miss_count = self.misses.load(Ordering::Relaxed);
        let last_cleanup = match self.last_cleanup.load(Ordering::Relaxed) {
            0 => None,
            at => Some(at),
        };

        CacheStats {
            total_entries: self.total_entries.load(Ordering::Relaxed),
            total_size_bytes: self.total_size_bytes.load(Ordering::Relaxed),
            hit_count,
            miss_count,
            hit_rate: hit_rate(hit_count, miss_count),
            eviction_count: self.evictions.load(Ordering::Relaxed),
            expired_count: self.expirations.load(Ordering::Relaxed),
            backend_usage: self.usage.iter().map(|e| (*e.key(), *e.value())).collect(),
            last_cleanup,
        }
    }
}

/// `hits / (hits + misses)`, or 0.0 when nothing has been looked up.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}
