//! Cache Module
//!
//! Storage of query results keyed by [`CacheKey`](crate::key::CacheKey),
//! with explicit entry status, LRU size bound and statistics.

mod entry;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use entry::{CacheEntry, EntryStatus};
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::{CacheStore, EntrySnapshot};

// == Public Constants ==
/// Default maximum number of entries held by a store
pub const DEFAULT_MAX_ENTRIES: usize = 1000;
