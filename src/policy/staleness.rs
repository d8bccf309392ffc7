//! Staleness Policy
//!
//! Per-family time-to-live deciding whether a cached value can be served
//! without a refetch.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheEntry, EntryStatus};

// == Staleness Rule ==
/// TTL for one resource family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessRule {
    pub family: String,
    pub ttl_ms: u64,
}

impl StalenessRule {
    pub fn new(family: impl Into<String>, ttl: Duration) -> Self {
        Self {
            family: family.into(),
            ttl_ms: ttl.as_millis() as u64,
        }
    }
}

// == Staleness Policy ==
/// Family to TTL table with a fallback for families without a rule.
///
/// The fallback defaults to zero: an entry is stale as soon as it is
/// fetched, so every read refetches (while still serving the old value).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StalenessPolicy {
    default_ttl_ms: u64,
    rules: HashMap<String, u64>,
}

impl StalenessPolicy {
    pub fn new(default_ttl_ms: u64) -> Self {
        Self {
            default_ttl_ms,
            rules: HashMap::new(),
        }
    }

    /// Adds or replaces the rule for a family.
    pub fn with_rule(mut self, rule: StalenessRule) -> Self {
        self.rules.insert(rule.family, rule.ttl_ms);
        self
    }

    pub fn with_rules<I>(self, rules: I) -> Self
    where
        I: IntoIterator<Item = StalenessRule>,
    {
        rules.into_iter().fold(self, |policy, rule| policy.with_rule(rule))
    }

    pub fn default_ttl_ms(&self) -> u64 {
        self.default_ttl_ms
    }

    /// TTL for a family, falling back to the default.
    pub fn ttl_for(&self, family: Option<&str>) -> u64 {
        family
            .and_then(|family| self.rules.get(family))
            .copied()
            .unwrap_or(self.default_ttl_ms)
    }

    // == Is Fresh ==
    /// True when the entry can be served without refetching.
    ///
    /// Requires `Fresh` status and an age strictly below the family TTL:
    /// with a 60s TTL an entry fetched at 0 is fresh at 59_999 and stale
    /// at 60_000.
    pub fn is_fresh(&self, entry: &CacheEntry, now: u64) -> bool {
        if entry.status() != EntryStatus::Fresh {
            return false;
        }
        match entry.age_ms(now) {
            Some(age) => age < self.ttl_for(entry.key().family()),
            None => false,
        }
    }

    /// Rules in family order, for debug output.
    pub fn rules(&self) -> Vec<StalenessRule> {
        let mut rules: Vec<StalenessRule> = self
            .rules
            .iter()
            .map(|(family, ttl_ms)| StalenessRule {
                family: family.clone(),
                ttl_ms: *ttl_ms,
            })
            .collect();
        rules.sort_by(|a, b| a.family.cmp(&b.family));
        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::key::CacheKey;
    use serde_json::json;

    fn entry(family: &str, fetched_at: u64) -> CacheEntry {
        CacheEntry::fresh(CacheKey::build(family, Some("t1"), "list", None), json!([]), fetched_at)
    }

    #[test]
    fn test_boundary() {
        let policy = StalenessPolicy::new(0)
            .with_rule(StalenessRule::new("exceptions", Duration::from_millis(60_000)));
        let entry = entry("exceptions", 0);

        assert!(policy.is_fresh(&entry, 0));
        assert!(policy.is_fresh(&entry, 59_999));
        assert!(!policy.is_fresh(&entry, 60_000));
    }

    #[test]
    fn test_missing_rule_means_always_stale() {
        let policy = StalenessPolicy::default();
        let entry = entry("dead_letters", 1_000);
        assert!(!policy.is_fresh(&entry, 1_000));
    }

    #[test]
    fn test_default_ttl_applies_to_unknown_families() {
        let policy = StalenessPolicy::new(5_000);
        assert_eq!(policy.ttl_for(Some("anything")), 5_000);
        assert_eq!(policy.ttl_for(None), 5_000);
        assert!(policy.is_fresh(&entry("anything", 0), 4_999));
    }

    #[test]
    fn test_non_fresh_status_is_never_fresh() {
        let policy = StalenessPolicy::new(60_000);

        let mut stale = entry("exceptions", 0);
        stale.mark_stale(1);
        assert!(!policy.is_fresh(&stale, 1));

        let mut failed = entry("exceptions", 0);
        failed.begin_fetch(1);
        failed.fail(FetchError::network("down"), 2);
        assert!(!policy.is_fresh(&failed, 2));

        let mut loading = CacheEntry::idle(CacheKey::root("exceptions"), 0);
        loading.begin_fetch(0);
        assert!(!policy.is_fresh(&loading, 0));
    }

    #[test]
    fn test_rules_are_listed_sorted() {
        let policy = StalenessPolicy::new(0).with_rules(vec![
            StalenessRule::new("workers", Duration::from_secs(10)),
            StalenessRule::new("config", Duration::from_secs(300)),
        ]);
        let families: Vec<String> = policy.rules().into_iter().map(|r| r.family).collect();
        assert_eq!(families, vec!["config", "workers"]);
    }
}
