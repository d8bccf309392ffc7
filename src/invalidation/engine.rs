//! Invalidation Engine
//!
//! Marks cache entries stale after a successful mutation. Marking is
//! synchronous and never fetches; the next read of a marked key refetches.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::{InvalidationRule, KeyMatcher, MutationContext};
use crate::cache::CacheStore;
use crate::key::CacheKey;

// == Invalidation Engine ==
/// Registry of invalidation rules, evaluated per trigger.
#[derive(Debug, Clone, Default)]
pub struct InvalidationEngine {
    rules: Vec<InvalidationRule>,
}

impl InvalidationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: InvalidationRule) -> Self {
        self.register(rule);
        self
    }

    pub fn with_rules<I>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = InvalidationRule>,
    {
        for rule in rules {
            self.register(rule);
        }
        self
    }

    /// Adds a rule. An identical rule already registered is not duplicated.
    pub fn register(&mut self, rule: InvalidationRule) {
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
    }

    pub fn rules(&self) -> &[InvalidationRule] {
        &self.rules
    }

    pub fn rules_for<'a>(&'a self, trigger: &'a str) -> impl Iterator<Item = &'a InvalidationRule> {
        self.rules.iter().filter(move |rule| rule.trigger == trigger)
    }

    /// Resolves every rule for `trigger` against the context.
    ///
    /// Rules the context cannot satisfy are skipped with a warning.
    pub fn matchers(&self, trigger: &str, context: &MutationContext) -> Vec<KeyMatcher> {
        self.rules_for(trigger)
            .filter_map(|rule| {
                let matcher = rule.target.resolve(context);
                if matcher.is_none() {
                    warn!(
                        trigger,
                        target = ?rule.target,
                        "invalidation rule skipped: mutation context has no entity id"
                    );
                }
                matcher
            })
            .collect()
    }

    // == Invalidate ==
    /// Marks stale every stored key matched by a rule for `trigger`.
    ///
    /// Returns the set of affected keys. Unknown triggers affect nothing.
    pub fn invalidate(
        &self,
        store: &mut CacheStore,
        trigger: &str,
        context: &MutationContext,
        now: u64,
    ) -> HashSet<CacheKey> {
        let matchers = self.matchers(trigger, context);
        if matchers.is_empty() {
            debug!(trigger, "no invalidation rules for trigger");
            return HashSet::new();
        }

        let affected: HashSet<CacheKey> = store
            .mark_stale(|key| matchers.iter().any(|m| m.matches(key)), now)
            .into_iter()
            .collect();

        info!(
            trigger,
            rules = matchers.len(),
            affected = affected.len(),
            "invalidated cache entries"
        );
        affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, EntryStatus};
    use crate::key::{KeyFactory, Params};
    use serde_json::json;

    const EXCEPTIONS: KeyFactory = KeyFactory::new("exceptions");
    const AUDIT: KeyFactory = KeyFactory::new("audit");
    const PLAYBOOKS: KeyFactory = KeyFactory::new("playbook_status");

    fn seeded_store(keys: &[CacheKey]) -> CacheStore {
        let mut store = CacheStore::new(100);
        for key in keys {
            store.set(CacheEntry::fresh(key.clone(), json!({}), 0)).unwrap();
        }
        store
    }

    #[test]
    fn test_cascade_reaches_sibling_families() {
        let x_detail = EXCEPTIONS.detail(Some("t1"), "X");
        let x_evidence = EXCEPTIONS.scoped("evidence", Some("t1"), "X");
        let x_audit = AUDIT.scoped("exception", Some("t1"), "X");
        let x_playbook = PLAYBOOKS.detail(Some("t1"), "X");
        let y_detail = EXCEPTIONS.detail(Some("t1"), "Y");
        let mut store = seeded_store(&[
            x_detail.clone(),
            x_evidence.clone(),
            x_audit.clone(),
            x_playbook.clone(),
            y_detail.clone(),
        ]);

        let engine = InvalidationEngine::new().with_rule(InvalidationRule::entity(
            "complete_step",
            &["exceptions", "audit", "playbook_status"],
        ));
        let affected = engine.invalidate(
            &mut store,
            "complete_step",
            &MutationContext::tenant("t1").entity("X"),
            1,
        );

        let expected: HashSet<CacheKey> =
            [x_detail, x_evidence, x_audit, x_playbook].into_iter().collect();
        assert_eq!(affected, expected);
        for key in &expected {
            assert_eq!(store.peek(key).unwrap().status(), EntryStatus::Stale);
        }
        assert_eq!(store.peek(&y_detail).unwrap().status(), EntryStatus::Fresh);
    }

    #[test]
    fn test_multiple_rules_union() {
        let list = EXCEPTIONS.list(Some("t1"), Params::new().with("status", "open"));
        let detail = EXCEPTIONS.detail(Some("t1"), "X");
        let other_tenant_list = EXCEPTIONS.list(Some("t2"), Params::new());
        let mut store = seeded_store(&[list.clone(), detail.clone(), other_tenant_list.clone()]);

        let engine = InvalidationEngine::new()
            .with_rule(InvalidationRule::tenant_prefix("resolve", &["exceptions", "list"]))
            .with_rule(InvalidationRule::entity("resolve", &["exceptions"]));

        let affected = engine.invalidate(
            &mut store,
            "resolve",
            &MutationContext::tenant("t1").entity("X"),
            1,
        );

        assert_eq!(affected.len(), 2);
        assert!(affected.contains(&list));
        assert!(affected.contains(&detail));
        assert_eq!(store.peek(&other_tenant_list).unwrap().status(), EntryStatus::Fresh);
    }

    #[test]
    fn test_unknown_trigger_is_noop() {
        let key = EXCEPTIONS.detail(Some("t1"), "X");
        let mut store = seeded_store(&[key.clone()]);
        let engine = InvalidationEngine::new()
            .with_rule(InvalidationRule::prefix("resolve", EXCEPTIONS.all()));

        let affected = engine.invalidate(&mut store, "archive", &MutationContext::global(), 1);
        assert!(affected.is_empty());
        assert_eq!(store.peek(&key).unwrap().status(), EntryStatus::Fresh);
    }

    #[test]
    fn test_register_deduplicates() {
        let mut engine = InvalidationEngine::new();
        engine.register(InvalidationRule::prefix("resolve", EXCEPTIONS.all()));
        engine.register(InvalidationRule::prefix("resolve", EXCEPTIONS.all()));
        assert_eq!(engine.rules().len(), 1);
        assert_eq!(engine.rules_for("resolve").count(), 1);
        assert_eq!(engine.rules_for("other").count(), 0);
    }

    #[test]
    fn test_entity_rule_without_entity_is_skipped() {
        let key = EXCEPTIONS.detail(Some("t1"), "X");
        let mut store = seeded_store(&[key.clone()]);
        let engine = InvalidationEngine::new()
            .with_rule(InvalidationRule::entity("complete_step", &[]));

        let affected =
            engine.invalidate(&mut store, "complete_step", &MutationContext::tenant("t1"), 1);
        assert!(affected.is_empty());
    }
}
