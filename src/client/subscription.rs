//! Subscriptions
//!
//! Observer bookkeeping for garbage collection, and the change stream a
//! rendering layer listens on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::cache::EntryStatus;
use crate::key::CacheKey;

// == Cache Event ==
/// Change notification for one key.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// A fetch started or finished, or data was written directly
    Updated { key: CacheKey, status: EntryStatus },
    /// The entry was marked stale by a mutation
    Invalidated { key: CacheKey },
    /// The entry left the store
    Removed { key: CacheKey },
}

impl CacheEvent {
    pub fn key(&self) -> &CacheKey {
        match self {
            CacheEvent::Updated { key, .. }
            | CacheEvent::Invalidated { key }
            | CacheEvent::Removed { key } => key,
        }
    }
}

// == Observer Registry ==
/// Live subscription counts per key.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    counts: Mutex<HashMap<CacheKey, usize>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, key: &CacheKey) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        *counts.entry(key.clone()).or_insert(0) += 1;
    }

    pub fn release(&self, key: &CacheKey) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = counts.get_mut(key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(key);
            }
        }
    }

    pub fn observers(&self, key: &CacheKey) -> usize {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.get(key).copied().unwrap_or(0)
    }

    pub fn is_observed(&self, key: &CacheKey) -> bool {
        self.observers(key) > 0
    }
}

// == Subscription ==
/// A live observer of one key.
///
/// While held, the entry is exempt from garbage collection. Dropping it
/// releases the observer count; no events are delivered afterwards.
#[derive(Debug)]
pub struct Subscription {
    key: CacheKey,
    registry: Arc<ObserverRegistry>,
    events: broadcast::Receiver<CacheEvent>,
}

impl Subscription {
    pub(crate) fn new(
        key: CacheKey,
        registry: Arc<ObserverRegistry>,
        events: broadcast::Receiver<CacheEvent>,
    ) -> Self {
        registry.acquire(&key);
        Self {
            key,
            registry,
            events,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Waits for the next event concerning this key.
    ///
    /// Returns None once the client is gone. Events missed because the
    /// receiver lagged are skipped; callers re-read the entry anyway.
    pub async fn changed(&mut self) -> Option<CacheEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) if event.key() == &self.key => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns an already delivered event for this key, if any, without waiting.
    pub fn try_changed(&mut self) -> Option<CacheEvent> {
        loop {
            match self.events.try_recv() {
                Ok(event) if event.key() == &self.key => return Some(event),
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyFactory;

    const SLA: KeyFactory = KeyFactory::new("sla");

    #[test]
    fn test_registry_counts() {
        let registry = ObserverRegistry::new();
        let key = SLA.detail(Some("t1"), "x");

        registry.acquire(&key);
        registry.acquire(&key);
        assert_eq!(registry.observers(&key), 2);

        registry.release(&key);
        assert!(registry.is_observed(&key));
        registry.release(&key);
        assert!(!registry.is_observed(&key));

        // Releasing an unknown key is a no-op
        registry.release(&key);
        assert_eq!(registry.observers(&key), 0);
    }

    #[tokio::test]
    async fn test_subscription_filters_by_key() {
        let registry = Arc::new(ObserverRegistry::new());
        let (tx, rx) = broadcast::channel(16);
        let mine = SLA.detail(Some("t1"), "x");
        let other = SLA.detail(Some("t1"), "y");

        let mut subscription = Subscription::new(mine.clone(), registry.clone(), rx);
        assert_eq!(registry.observers(&mine), 1);

        tx.send(CacheEvent::Invalidated { key: other }).unwrap();
        tx.send(CacheEvent::Removed { key: mine.clone() }).unwrap();

        let event = subscription.changed().await.unwrap();
        assert_eq!(event, CacheEvent::Removed { key: mine.clone() });
        assert!(subscription.try_changed().is_none());

        drop(subscription);
        assert_eq!(registry.observers(&mine), 0);
    }

    #[tokio::test]
    async fn test_subscription_ends_when_sender_dropped() {
        let registry = Arc::new(ObserverRegistry::new());
        let (tx, rx) = broadcast::channel(4);
        let mut subscription = Subscription::new(SLA.all(), registry, rx);

        drop(tx);
        assert!(subscription.changed().await.is_none());
    }
}
