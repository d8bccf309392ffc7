//! Cache Store Module
//!
//! Mapping from cache key to entry, bounded by an LRU policy.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, EntryStatus, LruTracker};
use crate::error::{CacheError, FetchError, Result};
use crate::key::CacheKey;

// == Entry Snapshot ==
/// Serializable view of one entry, for debug dumps.
#[derive(Debug, Clone, Serialize)]
pub struct EntrySnapshot {
    pub key: CacheKey,
    pub status: EntryStatus,
    pub fetched_at: Option<DateTime<Utc>>,
    pub has_value: bool,
    pub error: Option<FetchError>,
    pub fetch_count: u32,
}

impl From<&CacheEntry> for EntrySnapshot {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key().clone(),
            status: entry.status(),
            fetched_at: entry.fetched_at_utc(),
            has_value: entry.value().is_some(),
            error: entry.error().cloned(),
            fetch_count: entry.fetch_count(),
        }
    }
}

// == Cache Store ==
/// Key to entry storage with LRU-bounded size.
#[derive(Debug)]
pub struct CacheStore {
    /// Entry storage
    entries: HashMap<CacheKey, CacheEntry>,
    /// LRU access tracker
    lru: LruTracker,
    /// Counters
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_entries: usize,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_entries: max_entries.max(1),
        }
    }

    // == Get ==
    /// Returns the entry for `key` and marks it recently used.
    pub fn get(&mut self, key: &CacheKey) -> Option<&CacheEntry> {
        if self.entries.contains_key(key) {
            self.lru.touch(key);
        }
        self.entries.get(key)
    }

    /// Returns the entry for `key` without touching the LRU order.
    pub fn peek(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    // == Set ==
    /// Stores an entry under its own key, replacing any previous entry.
    ///
    /// At capacity, the least recently used entry without a fetch in flight
    /// is evicted first. If every entry is mid-fetch the store grows past
    /// its bound rather than dropping a pending result.
    pub fn set(&mut self, entry: CacheEntry) -> Result<()> {
        let key = entry.key().clone();
        if key.family().is_none() {
            return Err(CacheError::InvalidKey(format!(
                "key must start with a resource family tag: {}",
                key
            )));
        }

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict_one();
        }

        self.entries.insert(key.clone(), entry);
        self.lru.touch(&key);
        self.stats.set_total_entries(self.entries.len());
        Ok(())
    }

    fn evict_one(&mut self) {
        let entries = &self.entries;
        let evicted = self.lru.evict_oldest_where(|key| {
            entries
                .get(key)
                .map_or(true, |entry| !entry.status().is_fetching())
        });

        if let Some(key) = evicted {
            self.entries.remove(&key);
            self.stats.record_eviction();
            debug!(key = %key, "evicted least recently used entry");
        }
    }

    // == Fetch Transitions ==
    /// Marks `key` as fetching, creating a `Loading` entry if it is missing.
    pub fn begin_fetch(&mut self, key: &CacheKey, now: u64) -> Result<CacheEntry> {
        if !self.entries.contains_key(key) {
            self.set(CacheEntry::idle(key.clone(), now))?;
        }
        self.stats.record_fetch();
        self.with_entry(key, now, |entry| entry.begin_fetch(now))
    }

    /// Writes a successful fetch result.
    ///
    /// The entry is recreated if it was deleted or evicted while the fetch
    /// was in flight.
    pub fn resolve(&mut self, key: &CacheKey, value: Value, now: u64) -> Result<CacheEntry> {
        self.with_entry(key, now, |entry| entry.resolve(value, now))
    }

    /// Writes a terminal fetch failure.
    pub fn fail(&mut self, key: &CacheKey, error: FetchError, now: u64) -> Result<CacheEntry> {
        self.stats.record_failure();
        self.with_entry(key, now, |entry| entry.fail(error, now))
    }

    /// Replaces the value of `key` directly, as after an optimistic update.
    pub fn set_value(&mut self, key: &CacheKey, value: Value, now: u64) -> Result<CacheEntry> {
        self.with_entry(key, now, |entry| entry.resolve(value, now))
    }

    fn with_entry<F>(&mut self, key: &CacheKey, now: u64, apply: F) -> Result<CacheEntry>
    where
        F: FnOnce(&mut CacheEntry),
    {
        if !self.entries.contains_key(key) {
            self.set(CacheEntry::idle(key.clone(), now))?;
        }
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
        apply(entry);
        let snapshot = entry.clone();
        self.lru.touch(key);
        Ok(snapshot)
    }

    // == Mark Stale ==
    /// Marks every entry whose key satisfies `predicate` as stale.
    ///
    /// Values are kept so they can be shown while the refetch runs.
    /// Returns the keys that matched.
    pub fn mark_stale<P>(&mut self, predicate: P, now: u64) -> Vec<CacheKey>
    where
        P: Fn(&CacheKey) -> bool,
    {
        let mut matched = Vec::new();
        for (key, entry) in self.entries.iter_mut() {
            if predicate(key) {
                entry.mark_stale(now);
                matched.push(key.clone());
            }
        }
        self.stats.record_invalidations(matched.len());
        matched
    }

    // == Delete ==
    /// Removes an entry by key.
    pub fn delete(&mut self, key: &CacheKey) -> Result<CacheEntry> {
        let entry = self
            .entries
            .remove(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
        self.lru.remove(key);
        self.stats.set_total_entries(self.entries.len());
        Ok(entry)
    }

    // == Garbage Collection ==
    /// Removes entries nobody observes that have been untouched for `gc_time_ms`.
    ///
    /// Entries with a fetch in flight are kept. Returns the removed keys.
    pub fn remove_unobserved<F>(&mut self, is_observed: F, now: u64, gc_time_ms: u64) -> Vec<CacheKey>
    where
        F: Fn(&CacheKey) -> bool,
    {
        let idle_keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(key, entry)| {
                !entry.status().is_fetching()
                    && !is_observed(key)
                    && now.saturating_sub(entry.updated_at()) >= gc_time_ms
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &idle_keys {
            self.entries.remove(key);
            self.lru.remove(key);
        }

        self.stats.record_collected(idle_keys.len());
        self.stats.set_total_entries(self.entries.len());
        idle_keys
    }

    // == Inspection ==
    pub fn keys(&self) -> Vec<CacheKey> {
        self.entries.keys().cloned().collect()
    }

    /// Debug view of every entry, ordered by key.
    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        let mut snapshot: Vec<EntrySnapshot> =
            self.entries.values().map(EntrySnapshot::from).collect();
        snapshot.sort_by(|a, b| a.key.cmp(&b.key));
        snapshot
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    /// Mutable access to the counters, for the read path.
    pub(crate) fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
