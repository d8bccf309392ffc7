//! Cache Key Module
//!
//! Hierarchical cache keys built from typed segments.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Params;

// == Segment ==
/// One element of a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Segment {
    /// Resource family or operation tag (`"exceptions"`, `"list"`, ...)
    Tag(String),
    /// Tenant scope. `None` marks a tenant-agnostic resource and is distinct
    /// from any tenant id, including the empty string.
    Tenant(Option<String>),
    /// Identifier of a single entity
    Entity(String),
    /// Normalized query parameters
    Params(Params),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Tag(tag) => write!(f, "{}", tag),
            Segment::Tenant(Some(tenant)) => write!(f, "tenant:{}", tenant),
            Segment::Tenant(None) => write!(f, "tenant:*"),
            Segment::Entity(id) => write!(f, "#{}", id),
            Segment::Params(params) => write!(f, "{}", params),
        }
    }
}

// == Cache Key ==
/// Ordered, immutable sequence of segments identifying one cached result.
///
/// Keys form a prefix hierarchy: `[exceptions]` is a prefix of
/// `[exceptions, list]`, which is a prefix of
/// `[exceptions, list, tenant:t1, {"status":"open"}]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey {
    segments: Vec<Segment>,
}

impl CacheKey {
    /// Creates a key from raw segments.
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Creates a single-segment family key.
    pub fn root(family: impl Into<String>) -> Self {
        Self::new(vec![Segment::Tag(family.into())])
    }

    // == Build ==
    /// Derives the canonical key for `(family, tenant, operation, params)`.
    ///
    /// Produces `[family, op, tenant, params]`. The params segment is left
    /// out when params are absent or normalize to an empty object, so
    /// `None` and `Some(Params::new())` key identically. The tenant segment
    /// is always present, `None` included.
    pub fn build(family: &str, tenant: Option<&str>, op: &str, params: Option<Params>) -> Self {
        let mut segments = vec![
            Segment::Tag(family.to_string()),
            Segment::Tag(op.to_string()),
            Segment::Tenant(tenant.map(str::to_string)),
        ];
        if let Some(params) = params.filter(|p| !p.is_empty()) {
            segments.push(Segment::Params(params));
        }
        Self::new(segments)
    }

    /// Returns a new key with one more segment appended.
    pub fn child(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self::new(segments)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    // == Accessors ==
    /// Resource family: the leading tag segment.
    pub fn family(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Tag(tag)) => Some(tag),
            _ => None,
        }
    }

    /// Operation tag: the second segment when it is a tag.
    pub fn operation(&self) -> Option<&str> {
        match self.segments.get(1) {
            Some(Segment::Tag(tag)) => Some(tag),
            _ => None,
        }
    }

    /// Tenant segment, if the key has one.
    ///
    /// `Some(None)` means the key is explicitly tenant-agnostic.
    pub fn tenant(&self) -> Option<Option<&str>> {
        self.segments.iter().find_map(|segment| match segment {
            Segment::Tenant(tenant) => Some(tenant.as_deref()),
            _ => None,
        })
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.segments.iter().find_map(|segment| match segment {
            Segment::Entity(id) => Some(id.as_str()),
            _ => None,
        })
    }

    pub fn params(&self) -> Option<&Params> {
        self.segments.iter().find_map(|segment| match segment {
            Segment::Params(params) => Some(params),
            _ => None,
        })
    }

    // == Prefix Matching ==
    /// True when every segment of `self` equals the leading segments of `other`.
    ///
    /// A key is a prefix of itself.
    pub fn is_prefix_of(&self, other: &CacheKey) -> bool {
        other.segments.starts_with(&self.segments)
    }

    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        prefix.is_prefix_of(self)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", segment)?;
        }
        write!(f, "]")
    }
}
