//! Cache Statistics Module
//!
//! Counters for reads, fetches, retries and invalidations.

use serde::Serialize;

// == Cache Stats ==
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads served from a fresh entry
    pub hits: u64,
    /// Reads that needed a fetch
    pub misses: u64,
    /// Fetches started (one per single-flight group)
    pub fetches: u64,
    /// Reads that attached to a fetch already in flight
    pub coalesced: u64,
    /// Transport attempts beyond the first one of a fetch
    pub retries: u64,
    /// Fetches that ended in an error entry
    pub failures: u64,
    /// Entries marked stale by mutations
    pub invalidations: u64,
    /// Entries dropped to respect the size bound
    pub evictions: u64,
    /// Unobserved entries removed by garbage collection
    pub collected: u64,
    /// Current number of entries in the store
    pub total_entries: usize,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_fetch(&mut self) {
        self.fetches += 1;
    }

    pub fn record_coalesced(&mut self) {
        self.coalesced += 1;
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn record_invalidations(&mut self, count: usize) {
        self.invalidations += count as u64;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_collected(&mut self, count: usize) {
        self.collected += count as u64;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
