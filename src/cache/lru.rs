//! LRU Tracker Module
//!
//! Implements Least Recently Used tracking for bounding the store size.

use std::collections::VecDeque;

use crate::key::CacheKey;

// == LRU Tracker ==
/// Tracks access order of cache keys.
///
/// Keys are stored in a VecDeque where:
/// - Front = Most recently used
/// - Back = Least recently used
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Order of keys by access time
    order: VecDeque<CacheKey>,
}

impl LruTracker {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Touch ==
    /// Marks a key as recently used (moves to front).
    pub fn touch(&mut self, key: &CacheKey) {
        self.remove(key);
        self.order.push_front(key.clone());
    }

    // == Remove ==
    /// Removes a key from the tracker.
    pub fn remove(&mut self, key: &CacheKey) {
        self.order.retain(|k| k != key);
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key accepted by `evictable`.
    ///
    /// Keys rejected by the predicate keep their position. Returns None if
    /// no tracked key is evictable.
    pub fn evict_oldest_where<F>(&mut self, evictable: F) -> Option<CacheKey>
    where
        F: Fn(&CacheKey) -> bool,
    {
        let position = self.order.iter().rposition(|key| evictable(key))?;
        self.order.remove(position)
    }

}

// Inspection helpers for the tests below; the store only touches, removes
// and evicts.
#[cfg(test)]
impl LruTracker {
    fn peek_oldest(&self) -> Option<&CacheKey> {
        self.order.back()
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn contains(&self, key: &CacheKey) -> bool {
        self.order.iter().any(|k| k == key)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> CacheKey {
        CacheKey::build("exceptions", Some("t1"), "detail", None)
            .child(crate::key::Segment::Entity(id.to_string()))
    }

    #[test]
    fn test_lru_new() {
        let lru = LruTracker::new();
        assert!(lru.is_empty());
        assert_eq!(lru.len(), 0);
    }

    #[test]
    fn test_touch_orders_keys() {
        let mut lru = LruTracker::new();
        lru.touch(&key("a"));
        lru.touch(&key("b"));
        lru.touch(&key("c"));

        assert_eq!(lru.len(), 3);
        assert_eq!(lru.peek_oldest(), Some(&key("a")));

        lru.touch(&key("a"));
        assert_eq!(lru.peek_oldest(), Some(&key("b")));
        assert_eq!(lru.len(), 3);
    }

    #[test]
    fn test_evict_oldest_where_skips_rejected() {
        let mut lru = LruTracker::new();
        lru.touch(&key("a"));
        lru.touch(&key("b"));
        lru.touch(&key("c"));

        let pinned = key("a");
        let evicted = lru.evict_oldest_where(|k| k != &pinned);
        assert_eq!(evicted, Some(key("b")));
        assert_eq!(lru.peek_oldest(), Some(&key("a")));
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn test_evict_when_nothing_evictable() {
        let mut lru = LruTracker::new();
        lru.touch(&key("a"));
        assert_eq!(lru.evict_oldest_where(|_| false), None);
        assert_eq!(lru.len(), 1);

        let mut empty = LruTracker::new();
        assert_eq!(empty.evict_oldest_where(|_| true), None);
    }

    #[test]
    fn test_remove() {
        let mut lru = LruTracker::new();
        lru.touch(&key("a"));
        lru.touch(&key("b"));
        lru.remove(&key("a"));
        lru.remove(&key("missing"));

        assert_eq!(lru.len(), 1);
        assert!(!lru.contains(&key("a")));
        assert!(lru.contains(&key("b")));
    }
}
