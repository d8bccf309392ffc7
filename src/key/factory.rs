//! Key Factory Module
//!
//! Per-family helpers that build every key of a resource family from one
//! place, so call sites and invalidation rules agree on the hierarchy.

use super::{CacheKey, Params, Segment};

/// Operation tag used for collection reads.
pub const LIST: &str = "list";
/// Operation tag used for single-entity reads.
pub const DETAIL: &str = "detail";

// == Key Factory ==
/// Builds the key hierarchy of one resource family.
///
/// ```text
/// all()                 [family]
/// lists()               [family, list]
/// list(tenant, params)  [family, list, tenant, params]
/// details()             [family, detail]
/// detail(tenant, id)    [family, detail, tenant, #id]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyFactory {
    family: &'static str,
}

impl KeyFactory {
    pub const fn new(family: &'static str) -> Self {
        Self { family }
    }

    pub fn family(&self) -> &'static str {
        self.family
    }

    pub fn all(&self) -> CacheKey {
        CacheKey::root(self.family)
    }

    pub fn lists(&self) -> CacheKey {
        self.all().child(Segment::Tag(LIST.to_string()))
    }

    pub fn list(&self, tenant: Option<&str>, params: Params) -> CacheKey {
        CacheKey::build(self.family, tenant, LIST, Some(params))
    }

    pub fn details(&self) -> CacheKey {
        self.all().child(Segment::Tag(DETAIL.to_string()))
    }

    pub fn detail(&self, tenant: Option<&str>, id: &str) -> CacheKey {
        self.scoped(DETAIL, tenant, id)
    }

    /// Key for a named sub-resource of one entity, e.g. `[exceptions, evidence, tenant, #id]`.
    pub fn scoped(&self, op: &str, tenant: Option<&str>, id: &str) -> CacheKey {
        CacheKey::build(self.family, tenant, op, None).child(Segment::Entity(id.to_string()))
    }

    /// Key for a tenant-level operation without an entity, e.g. `[sla, summary, tenant, params]`.
    pub fn operation(&self, op: &str, tenant: Option<&str>, params: Option<Params>) -> CacheKey {
        CacheKey::build(self.family, tenant, op, params)
    }
}
