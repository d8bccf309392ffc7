//! Key Module
//!
//! Canonical, hierarchical cache keys and the per-family factories that
//! build them.

mod cache_key;
mod factory;
mod params;

pub use cache_key::{CacheKey, Segment};
pub use factory::{KeyFactory, DETAIL, LIST};
pub use params::Params;
