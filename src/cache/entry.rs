//! Cache Entry Module
//!
//! Defines a cached query result and the status transitions it goes
//! through between reads, fetches and invalidations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FetchError;
use crate::key::CacheKey;

// == Entry Status ==
/// Lifecycle state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Never fetched (or fetch suppressed by an unmet precondition)
    Idle,
    /// First fetch in flight, nothing to show yet
    Loading,
    /// Value present and within its staleness window
    Fresh,
    /// Value present but must be refetched before it is trusted
    Stale,
    /// Previous value still served while a refetch is in flight
    StaleServing,
    /// Last fetch failed after retries
    Error,
}

impl EntryStatus {
    /// True while a fetch for the entry is running.
    pub fn is_fetching(self) -> bool {
        matches!(self, EntryStatus::Loading | EntryStatus::StaleServing)
    }
}

// == Cache Entry ==
/// A cached query result with fetch metadata.
///
/// Fields are only changed through the transition methods below, which keep
/// these invariants:
/// - `Fresh` implies a value and a fetch timestamp
/// - `Error` implies an error
/// - `StaleServing` implies a value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    key: CacheKey,
    value: Option<Value>,
    error: Option<FetchError>,
    /// Completion time of the last successful fetch (Unix milliseconds)
    fetched_at: Option<u64>,
    /// Last time the entry changed (Unix milliseconds)
    updated_at: u64,
    status: EntryStatus,
    /// Number of fetches started for this entry
    fetch_count: u32,
    /// Consecutive failed fetches
    failure_count: u32,
    /// Set when the entry is invalidated while a fetch is in flight, so
    /// the in-flight result lands as stale rather than fresh.
    #[serde(skip)]
    invalidated_in_flight: bool,
}

impl CacheEntry {
    // == Constructors ==
    /// Creates an entry that has never been fetched.
    pub fn idle(key: CacheKey, now: u64) -> Self {
        Self {
            key,
            value: None,
            error: None,
            fetched_at: None,
            updated_at: now,
            status: EntryStatus::Idle,
            fetch_count: 0,
            failure_count: 0,
            invalidated_in_flight: false,
        }
    }

    /// Creates a fresh entry holding `value`, fetched at `now`.
    pub fn fresh(key: CacheKey, value: Value, now: u64) -> Self {
        let mut entry = Self::idle(key, now);
        entry.resolve(value, now);
        entry
    }

    // == Accessors ==
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    pub fn fetched_at(&self) -> Option<u64> {
        self.fetched_at
    }

    /// Fetch timestamp as a UTC date, for logs and debug dumps.
    pub fn fetched_at_utc(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
            .and_then(|ms| i64::try_from(ms).ok())
            .and_then(DateTime::from_timestamp_millis)
    }

    pub fn updated_at(&self) -> u64 {
        self.updated_at
    }

    pub fn status(&self) -> EntryStatus {
        self.status
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetch_count
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Milliseconds since the last successful fetch. Clock skew reads as 0.
    pub fn age_ms(&self, now: u64) -> Option<u64> {
        self.fetched_at.map(|fetched| now.saturating_sub(fetched))
    }

    /// The value to show, or the error when there is nothing else to show.
    ///
    /// An entry whose refetch failed still yields its last-known value.
    pub fn result(&self) -> std::result::Result<Option<&Value>, &FetchError> {
        match (&self.value, &self.error, self.status) {
            (None, Some(error), EntryStatus::Error) => Err(error),
            (value, _, _) => Ok(value.as_ref()),
        }
    }

    // == Transitions ==
    /// A fetch starts: `Loading` without a value, `StaleServing` with one.
    pub fn begin_fetch(&mut self, now: u64) {
        self.status = if self.value.is_some() {
            EntryStatus::StaleServing
        } else {
            EntryStatus::Loading
        };
        self.invalidated_in_flight = false;
        self.fetch_count += 1;
        self.updated_at = now;
    }

    /// A fetch succeeded.
    pub fn resolve(&mut self, value: Value, now: u64) {
        self.value = Some(value);
        self.error = None;
        self.fetched_at = Some(now);
        self.failure_count = 0;
        self.updated_at = now;
        self.status = if self.invalidated_in_flight {
            EntryStatus::Stale
        } else {
            EntryStatus::Fresh
        };
        self.invalidated_in_flight = false;
    }

    /// A fetch failed for good. The last-known value is kept.
    pub fn fail(&mut self, error: FetchError, now: u64) {
        self.error = Some(error);
        self.failure_count += 1;
        self.updated_at = now;
        self.status = EntryStatus::Error;
        self.invalidated_in_flight = false;
    }

    /// Marks the entry as needing a refetch.
    ///
    /// `Fresh` becomes `Stale`. An in-flight fetch is left running, but its
    /// result will land as `Stale`. Other states already force a refetch.
    pub fn mark_stale(&mut self, now: u64) {
        match self.status {
            EntryStatus::Fresh => {
                self.status = EntryStatus::Stale;
                self.updated_at = now;
            }
            EntryStatus::Loading | EntryStatus::StaleServing => {
                self.invalidated_in_flight = true;
                self.updated_at = now;
            }
            EntryStatus::Idle | EntryStatus::Stale | EntryStatus::Error => {}
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key() -> CacheKey {
        CacheKey::build("exceptions", Some("t1"), "list", None)
    }

    #[test]
    fn test_idle_entry() {
        let entry = CacheEntry::idle(key(), 10);
        assert_eq!(entry.status(), EntryStatus::Idle);
        assert!(entry.value().is_none());
        assert!(entry.fetched_at().is_none());
        assert_eq!(entry.result(), Ok(None));
    }

    #[test]
    fn test_first_fetch_is_loading() {
        let mut entry = CacheEntry::idle(key(), 0);
        entry.begin_fetch(5);
        assert_eq!(entry.status(), EntryStatus::Loading);
        assert_eq!(entry.fetch_count(), 1);
        assert!(entry.status().is_fetching());
    }

    #[test]
    fn test_resolve_sets_fresh_invariants() {
        let mut entry = CacheEntry::idle(key(), 0);
        entry.begin_fetch(0);
        entry.resolve(json!({"items": []}), 100);

        assert_eq!(entry.status(), EntryStatus::Fresh);
        assert_eq!(entry.fetched_at(), Some(100));
        assert_eq!(entry.value(), Some(&json!({"items": []})));
        assert_eq!(entry.age_ms(160), Some(60));
    }

    #[test]
    fn test_refetch_with_value_is_stale_serving() {
        let mut entry = CacheEntry::fresh(key(), json!(1), 0);
        entry.mark_stale(10);
        assert_eq!(entry.status(), EntryStatus::Stale);

        entry.begin_fetch(20);
        assert_eq!(entry.status(), EntryStatus::StaleServing);
        assert_eq!(entry.value(), Some(&json!(1)));
    }

    #[test]
    fn test_fail_keeps_last_known_value() {
        let mut entry = CacheEntry::fresh(key(), json!(1), 0);
        entry.begin_fetch(10);
        entry.fail(FetchError::network("timeout"), 20);

        assert_eq!(entry.status(), EntryStatus::Error);
        assert!(entry.error().is_some());
        assert_eq!(entry.result(), Ok(Some(&json!(1))));
        assert_eq!(entry.failure_count(), 1);
    }

    #[test]
    fn test_fail_without_value_surfaces_error() {
        let mut entry = CacheEntry::idle(key(), 0);
        entry.begin_fetch(0);
        entry.fail(FetchError::not_found("gone"), 1);
        assert!(entry.result().is_err());
    }

    #[test]
    fn test_invalidated_during_fetch_lands_stale() {
        let mut entry = CacheEntry::idle(key(), 0);
        entry.begin_fetch(0);
        entry.mark_stale(5);
        assert_eq!(entry.status(), EntryStatus::Loading);

        entry.resolve(json!("old"), 10);
        assert_eq!(entry.status(), EntryStatus::Stale);
        assert_eq!(entry.value(), Some(&json!("old")));
    }

    #[test]
    fn test_mark_stale_on_error_is_noop() {
        let mut entry = CacheEntry::idle(key(), 0);
        entry.begin_fetch(0);
        entry.fail(FetchError::network("down"), 1);
        entry.mark_stale(2);
        assert_eq!(entry.status(), EntryStatus::Error);
    }

    #[test]
    fn test_age_with_clock_skew() {
        let entry = CacheEntry::fresh(key(), json!(1), 1_000);
        assert_eq!(entry.age_ms(500), Some(0));
    }

    #[test]
    fn test_fetched_at_utc() {
        let entry = CacheEntry::fresh(key(), json!(1), 1_700_000_000_000);
        let at = entry.fetched_at_utc().unwrap();
        assert_eq!(at.timestamp_millis(), 1_700_000_000_000);
    }
}
