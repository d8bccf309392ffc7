//! Invalidation Rules
//!
//! Rules are plain data: a trigger operation and a target template that is
//! resolved against the mutation's context into a [`KeyMatcher`].

use serde::{Deserialize, Serialize};

use crate::key::{CacheKey, Segment};

// == Mutation Context ==
/// What a mutation acted on, supplied by the call site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationContext {
    pub tenant: Option<String>,
    pub entity_id: Option<String>,
}

impl MutationContext {
    /// Context for a tenant-agnostic mutation.
    pub fn global() -> Self {
        Self::default()
    }

    pub fn tenant(tenant: impl Into<String>) -> Self {
        Self {
            tenant: Some(tenant.into()),
            entity_id: None,
        }
    }

    pub fn entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }
}

// == Key Matcher ==
/// A resolved predicate over cache keys.
///
/// Matching depends only on the key's segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyMatcher {
    /// Every key starting with `prefix`
    Prefix { prefix: CacheKey },
    /// Keys about one entity, whichever sub-resource they address
    Field(FieldMatch),
}

impl KeyMatcher {
    pub fn prefix(prefix: CacheKey) -> Self {
        KeyMatcher::Prefix { prefix }
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            KeyMatcher::Prefix { prefix } => prefix.is_prefix_of(key),
            KeyMatcher::Field(field) => field.matches(key),
        }
    }
}

/// Same tenant and same entity id, within a set of families.
///
/// An empty family list matches any family. This is what lets one action
/// on an exception reach its detail, evidence, audit and playbook-status
/// entries, which share no common key prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub families: Vec<String>,
    pub tenant: Option<String>,
    pub entity_id: String,
}

impl FieldMatch {
    pub fn matches(&self, key: &CacheKey) -> bool {
        let family_ok = self.families.is_empty()
            || key
                .family()
                .is_some_and(|family| self.families.iter().any(|f| f == family));

        family_ok
            && key.tenant() == Some(self.tenant.as_deref())
            && key.entity_id() == Some(self.entity_id.as_str())
    }
}

// == Target Rule ==
/// Which keys a rule invalidates, before the mutation context is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetRule {
    /// A fixed prefix, regardless of tenant.
    Prefix { prefix: CacheKey },
    /// `[tags.., tenant]` with the tenant taken from the context.
    TenantPrefix { tags: Vec<String> },
    /// The context's entity in the listed families (any family when empty).
    Entity { families: Vec<String> },
}

impl TargetRule {
    /// Resolves the template against a mutation context.
    ///
    /// Returns None when the context lacks what the template needs (an
    /// entity id for `Entity`).
    pub fn resolve(&self, context: &MutationContext) -> Option<KeyMatcher> {
        match self {
            TargetRule::Prefix { prefix } => Some(KeyMatcher::prefix(prefix.clone())),
            TargetRule::TenantPrefix { tags } => {
                let mut segments: Vec<Segment> =
                    tags.iter().cloned().map(Segment::Tag).collect();
                segments.push(Segment::Tenant(context.tenant.clone()));
                Some(KeyMatcher::prefix(CacheKey::new(segments)))
            }
            TargetRule::Entity { families } => {
                context.entity_id.as_ref().map(|entity_id| {
                    KeyMatcher::Field(FieldMatch {
                        families: families.clone(),
                        tenant: context.tenant.clone(),
                        entity_id: entity_id.clone(),
                    })
                })
            }
        }
    }
}

// == Invalidation Rule ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationRule {
    /// Mutation operation id that fires the rule
    pub trigger: String,
    pub target: TargetRule,
}

impl InvalidationRule {
    pub fn new(trigger: impl Into<String>, target: TargetRule) -> Self {
        Self {
            trigger: trigger.into(),
            target,
        }
    }

    pub fn prefix(trigger: impl Into<String>, prefix: CacheKey) -> Self {
        Self::new(trigger, TargetRule::Prefix { prefix })
    }

    pub fn tenant_prefix(trigger: impl Into<String>, tags: &[&str]) -> Self {
        Self::new(
            trigger,
            TargetRule::TenantPrefix {
                tags: tags.iter().map(|tag| tag.to_string()).collect(),
            },
        )
    }

    pub fn entity(trigger: impl Into<String>, families: &[&str]) -> Self {
        Self::new(
            trigger,
            TargetRule::Entity {
                families: families.iter().map(|f| f.to_string()).collect(),
            },
        )
    }
}
