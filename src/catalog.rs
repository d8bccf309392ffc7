//! Console Catalog
//!
//! Resource families of the exception-management console, their default
//! staleness windows, the invalidation rules fired by console mutations,
//! and resource descriptors for the screens that read them.

use std::time::Duration;

use crate::client::{QueryClientBuilder, Resource};
use crate::config::Config;
use crate::invalidation::{InvalidationEngine, InvalidationRule};
use crate::key::{CacheKey, KeyFactory, Params, LIST};
use crate::policy::{StalenessPolicy, StalenessRule};
use crate::transport::TransportRequest;

// == Families ==
pub const EXCEPTIONS: KeyFactory = KeyFactory::new("exceptions");
pub const EVIDENCE: KeyFactory = KeyFactory::new("evidence");
pub const AUDIT: KeyFactory = KeyFactory::new("audit");
pub const PLAYBOOK_STATUS: KeyFactory = KeyFactory::new("playbook_status");
pub const APPROVALS: KeyFactory = KeyFactory::new("approvals");
pub const DEAD_LETTERS: KeyFactory = KeyFactory::new("dead_letters");
pub const SLA: KeyFactory = KeyFactory::new("sla");
pub const WORKERS: KeyFactory = KeyFactory::new("workers");
pub const CONFIG: KeyFactory = KeyFactory::new("config");

// == Mutation Operations ==
pub const COMPLETE_STEP: &str = "exception.complete_step";
pub const RESOLVE_EXCEPTION: &str = "exception.resolve";
pub const ASSIGN_EXCEPTION: &str = "exception.assign";
pub const ADD_EVIDENCE: &str = "exception.add_evidence";
pub const DECIDE_APPROVAL: &str = "approval.decide";
pub const REPLAY_DEAD_LETTER: &str = "dead_letter.replay";
pub const UPDATE_CONFIG: &str = "config.update";

/// Operation tag of the SLA compliance aggregate.
pub const COMPLIANCE: &str = "compliance";

const SECOND: u64 = 1_000;
const MINUTE: u64 = 60 * SECOND;

/// Staleness windows: operational data tens of seconds, configuration minutes.
pub fn default_staleness() -> StalenessPolicy {
    let windows = [
        (EXCEPTIONS, 30 * SECOND),
        (EVIDENCE, 30 * SECOND),
        (AUDIT, 30 * SECOND),
        (PLAYBOOK_STATUS, 10 * SECOND),
        (APPROVALS, 15 * SECOND),
        (DEAD_LETTERS, 15 * SECOND),
        (SLA, MINUTE),
        (WORKERS, 10 * SECOND),
        (CONFIG, 5 * MINUTE),
    ];
    StalenessPolicy::new(0).with_rules(windows.into_iter().map(|(factory, ttl_ms)| {
        StalenessRule::new(factory.family(), Duration::from_millis(ttl_ms))
    }))
}

/// Rules fired after console mutations succeed.
///
/// Entity rules cover everything about the touched exception; tenant-prefix
/// rules refresh the lists and aggregates it shows up in.
pub fn default_rules() -> Vec<InvalidationRule> {
    let exception_views = [
        EXCEPTIONS.family(),
        EVIDENCE.family(),
        AUDIT.family(),
        PLAYBOOK_STATUS.family(),
    ];
    let exception_lists = [EXCEPTIONS.family(), LIST];

    vec![
        InvalidationRule::entity(COMPLETE_STEP, &exception_views),
        InvalidationRule::tenant_prefix(COMPLETE_STEP, &exception_lists),
        InvalidationRule::entity(RESOLVE_EXCEPTION, &exception_views),
        InvalidationRule::tenant_prefix(RESOLVE_EXCEPTION, &exception_lists),
        InvalidationRule::tenant_prefix(RESOLVE_EXCEPTION, &[SLA.family(), COMPLIANCE]),
        InvalidationRule::entity(ASSIGN_EXCEPTION, &[EXCEPTIONS.family(), AUDIT.family()]),
        InvalidationRule::tenant_prefix(ASSIGN_EXCEPTION, &exception_lists),
        InvalidationRule::entity(
            ADD_EVIDENCE,
            &[EXCEPTIONS.family(), EVIDENCE.family(), AUDIT.family()],
        ),
        InvalidationRule::tenant_prefix(DECIDE_APPROVAL, &[APPROVALS.family(), LIST]),
        InvalidationRule::entity(
            DECIDE_APPROVAL,
            &[EXCEPTIONS.family(), AUDIT.family(), PLAYBOOK_STATUS.family()],
        ),
        InvalidationRule::tenant_prefix(REPLAY_DEAD_LETTER, &[DEAD_LETTERS.family(), LIST]),
        InvalidationRule::tenant_prefix(REPLAY_DEAD_LETTER, &exception_lists),
        InvalidationRule::prefix(UPDATE_CONFIG, CONFIG.all()),
    ]
}

pub fn default_engine() -> InvalidationEngine {
    InvalidationEngine::new().with_rules(default_rules())
}

/// Client builder for the console: catalog rules and windows, with any
/// `STALE_TIME_OVERRIDES` from `config` taking precedence.
pub fn console_builder(config: &Config) -> QueryClientBuilder {
    let staleness = StalenessPolicy::new(config.default_stale_time_ms)
        .with_rules(default_staleness().rules())
        .with_rules(config.stale_time_overrides.iter().cloned());

    QueryClientBuilder::from_config(config)
        .staleness(staleness)
        .invalidation(default_engine())
}

// == Resources ==
pub fn exception_list(tenant: Option<&str>, filter: Params) -> Resource {
    Resource::tenant_scoped(
        EXCEPTIONS.list(tenant, filter.clone()),
        TransportRequest::get("/api/v1/exceptions").with_query(filter),
    )
}

pub fn exception_detail(tenant: Option<&str>, exception_id: &str) -> Resource {
    Resource::tenant_scoped(
        EXCEPTIONS.detail(tenant, exception_id),
        TransportRequest::get(format!("/api/v1/exceptions/{}", exception_id)),
    )
}

pub fn exception_evidence(tenant: Option<&str>, exception_id: &str) -> Resource {
    Resource::tenant_scoped(
        EVIDENCE.scoped("exception", tenant, exception_id),
        TransportRequest::get(format!("/api/v1/exceptions/{}/evidence", exception_id)),
    )
}

pub fn exception_audit(tenant: Option<&str>, exception_id: &str) -> Resource {
    Resource::tenant_scoped(
        AUDIT.scoped("exception", tenant, exception_id),
        TransportRequest::get(format!("/api/v1/exceptions/{}/audit", exception_id)),
    )
}

pub fn playbook_status(tenant: Option<&str>, exception_id: &str) -> Resource {
    Resource::tenant_scoped(
        PLAYBOOK_STATUS.detail(tenant, exception_id),
        TransportRequest::get(format!("/api/v1/exceptions/{}/playbook", exception_id)),
    )
}

pub fn approval_queue(tenant: Option<&str>, filter: Params) -> Resource {
    Resource::tenant_scoped(
        APPROVALS.list(tenant, filter.clone()),
        TransportRequest::get("/api/v1/approvals").with_query(filter),
    )
}

pub fn dead_letters(tenant: Option<&str>, filter: Params) -> Resource {
    Resource::tenant_scoped(
        DEAD_LETTERS.list(tenant, filter.clone()),
        TransportRequest::get("/api/v1/dead-letters").with_query(filter),
    )
}

pub fn sla_compliance(tenant: Option<&str>, window: Params) -> Resource {
    Resource::tenant_scoped(
        SLA.operation(COMPLIANCE, tenant, Some(window.clone())),
        TransportRequest::get("/api/v1/sla/compliance").with_query(window),
    )
}

/// Worker fleet health. Not tenant scoped.
pub fn worker_health() -> Resource {
    Resource::global(
        WORKERS.operation("health", None, None),
        TransportRequest::get("/api/v1/workers/health"),
    )
}

pub fn tenant_config(tenant: Option<&str>, section: &str) -> Resource {
    Resource::tenant_scoped(
        CONFIG.detail(tenant, section),
        TransportRequest::get(format!("/api/v1/config/{}", section)),
    )
}

/// Every key the console stores for one exception.
pub fn exception_keys(tenant: Option<&str>, exception_id: &str) -> Vec<CacheKey> {
    vec![
        exception_detail(tenant, exception_id).key,
        exception_evidence(tenant, exception_id).key,
        exception_audit(tenant, exception_id).key,
        playbook_status(tenant, exception_id).key,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, CacheStore, EntryStatus};
    use crate::invalidation::MutationContext;
    use crate::session::SessionContext;
    use serde_json::json;

    fn seeded(keys: &[CacheKey]) -> CacheStore {
        let mut store = CacheStore::new(100);
        for key in keys {
            store.set(CacheEntry::fresh(key.clone(), json!(1), 0)).unwrap();
        }
        store
    }

    #[test]
    fn test_complete_step_cascade() {
        let x_keys = exception_keys(Some("t1"), "X");
        let y_keys = exception_keys(Some("t1"), "Y");
        let open = exception_list(Some("t1"), Params::new().with("status", "open")).key;
        let other_tenant = exception_list(Some("t2"), Params::new()).key;
        let config = tenant_config(Some("t1"), "sla-policies").key;

        let mut all = x_keys.clone();
        all.extend(y_keys.iter().cloned());
        all.extend([open.clone(), other_tenant.clone(), config.clone()]);
        let mut store = seeded(&all);

        let context = MutationContext::tenant("t1").entity("X");
        let affected = default_engine().invalidate(&mut store, COMPLETE_STEP, &context, 1);

        for key in x_keys.iter().chain([&open]) {
            assert!(affected.contains(key), "{} should be affected", key);
            assert_eq!(store.peek(key).unwrap().status(), EntryStatus::Stale);
        }
        for key in y_keys.iter().chain([&other_tenant, &config]) {
            assert!(!affected.contains(key), "{} should be untouched", key);
            assert_eq!(store.peek(key).unwrap().status(), EntryStatus::Fresh);
        }
    }

    /// One key per catalog resource for tenant t1 and exception X.
    fn console_keys() -> Vec<CacheKey> {
        let mut keys = exception_keys(Some("t1"), "X");
        keys.extend([
            exception_list(Some("t1"), Params::new().with("status", "open")).key,
            approval_queue(Some("t1"), Params::new()).key,
            dead_letters(Some("t1"), Params::new().with("page", 1)).key,
            sla_compliance(Some("t1"), Params::new().with("window", "7d")).key,
            worker_health().key,
            tenant_config(Some("t1"), "sla-policies").key,
        ]);
        keys
    }

    #[test]
    fn test_resolve_refreshes_sla() {
        let sla = sla_compliance(Some("t1"), Params::new().with("window", "7d")).key;
        let other_tenant = sla_compliance(Some("t2"), Params::new().with("window", "7d")).key;
        let mut store = seeded(&[sla.clone(), other_tenant.clone()]);

        let context = MutationContext::tenant("t1").entity("X");
        let affected = default_engine().invalidate(&mut store, RESOLVE_EXCEPTION, &context, 1);
        assert!(affected.contains(&sla));
        assert_eq!(store.peek(&sla).unwrap().status(), EntryStatus::Stale);
        assert_eq!(store.peek(&other_tenant).unwrap().status(), EntryStatus::Fresh);
    }

    #[test]
    fn test_decide_approval_refreshes_queue() {
        let queue = approval_queue(Some("t1"), Params::new().with("state", "pending")).key;
        let other_tenant = approval_queue(Some("t2"), Params::new()).key;
        let detail = exception_detail(Some("t1"), "X").key;
        let evidence = exception_evidence(Some("t1"), "X").key;
        let mut store = seeded(&[queue.clone(), other_tenant.clone(), detail.clone(), evidence.clone()]);

        let context = MutationContext::tenant("t1").entity("X");
        let affected = default_engine().invalidate(&mut store, DECIDE_APPROVAL, &context, 1);

        for key in [&queue, &detail] {
            assert!(affected.contains(key), "{} should be affected", key);
            assert_eq!(store.peek(key).unwrap().status(), EntryStatus::Stale);
        }
        for key in [&other_tenant, &evidence] {
            assert!(!affected.contains(key), "{} should be untouched", key);
            assert_eq!(store.peek(key).unwrap().status(), EntryStatus::Fresh);
        }
    }

    #[test]
    fn test_replay_dead_letter_refreshes_dlq_and_exception_lists() {
        let dlq = dead_letters(Some("t1"), Params::new().with("page", 2)).key;
        let open = exception_list(Some("t1"), Params::new().with("status", "open")).key;
        let other_tenant = dead_letters(Some("t2"), Params::new()).key;
        let workers = worker_health().key;
        let mut store = seeded(&[dlq.clone(), open.clone(), other_tenant.clone(), workers.clone()]);

        let affected = default_engine().invalidate(
            &mut store,
            REPLAY_DEAD_LETTER,
            &MutationContext::tenant("t1").entity("DL-9"),
            1,
        );

        assert_eq!(affected.len(), 2);
        assert_eq!(store.peek(&dlq).unwrap().status(), EntryStatus::Stale);
        assert_eq!(store.peek(&open).unwrap().status(), EntryStatus::Stale);
        assert_eq!(store.peek(&other_tenant).unwrap().status(), EntryStatus::Fresh);
        assert_eq!(store.peek(&workers).unwrap().status(), EntryStatus::Fresh);
    }

    #[test]
    fn test_every_default_rule_reaches_a_console_key() {
        let context = MutationContext::tenant("t1").entity("X");

        for rule in default_rules() {
            let mut store = seeded(&console_keys());
            let engine = InvalidationEngine::new().with_rule(rule.clone());
            let affected = engine.invalidate(&mut store, &rule.trigger, &context, 1);

            assert!(!affected.is_empty(), "rule {:?} matched no console key", rule);
            for key in &affected {
                assert_eq!(store.peek(key).unwrap().status(), EntryStatus::Stale);
            }
        }
    }

    #[test]
    fn test_config_update_crosses_tenants() {
        let t1 = tenant_config(Some("t1"), "domain-pack").key;
        let t2 = tenant_config(Some("t2"), "domain-pack").key;
        let mut store = seeded(&[t1.clone(), t2.clone()]);

        let affected = default_engine().invalidate(
            &mut store,
            UPDATE_CONFIG,
            &MutationContext::global(),
            1,
        );
        assert_eq!(affected.len(), 2);
    }

    #[test]
    fn test_default_staleness_windows() {
        let policy = default_staleness();
        assert_eq!(policy.ttl_for(Some("config")), 5 * MINUTE);
        assert_eq!(policy.ttl_for(Some("workers")), 10 * SECOND);
        assert_eq!(policy.ttl_for(Some("unknown")), 0);
        assert!(policy.ttl_for(Some("config")) > policy.ttl_for(Some("exceptions")));
    }

    #[test]
    fn test_console_builder_applies_overrides() {
        let config = Config {
            stale_time_overrides: vec![StalenessRule::new("workers", Duration::from_secs(2))],
            ..Config::default()
        };
        let client = console_builder(&config).build();

        assert_eq!(client.staleness().ttl_for(Some("workers")), 2_000);
        assert_eq!(client.staleness().ttl_for(Some("config")), 5 * MINUTE);
        assert_eq!(client.rules().len(), default_rules().len());
    }

    #[test]
    fn test_resource_preconditions() {
        let session = SessionContext::authenticated("t1", "token");
        let no_tenant = SessionContext::new(None, Some("token".to_string()));

        let detail = exception_detail(session.tenant(), "X");
        assert!(detail.is_ready(&session));
        assert!(!exception_detail(no_tenant.tenant(), "X").is_ready(&no_tenant));
        assert!(worker_health().is_ready(&no_tenant));
        assert!(!worker_health().is_ready(&SessionContext::anonymous()));
    }

    #[test]
    fn test_list_resource_keys_share_params() {
        let filter = Params::new().with("severity", "high").with("owner", json!(null));
        let resource = exception_list(Some("t1"), filter);

        assert_eq!(resource.key.params(), Some(&resource.request.query));
        assert_eq!(resource.request.query.get("owner"), None);
    }
}
