//! Query Client Module
//!
//! The application-context handle tying the store, policies, invalidation
//! engine and fetch executor together. Cheap to clone; every clone shares
//! the same store.

mod executor;
mod resource;
mod subscription;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock as StdRwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{CacheEntry, CacheStats, CacheStore, EntrySnapshot, DEFAULT_MAX_ENTRIES};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::invalidation::{InvalidationEngine, InvalidationRule, KeyMatcher, MutationContext};
use crate::key::CacheKey;
use crate::policy::{RetryPolicy, StalenessPolicy};
use crate::tasks::spawn_gc_task;

pub use executor::FetchResult;
pub use resource::Resource;
pub use subscription::{CacheEvent, ObserverRegistry, Subscription};

/// Capacity of the change event channel
const EVENT_CAPACITY: usize = 256;

/// Default retention of unobserved entries, in milliseconds
pub const DEFAULT_GC_TIME_MS: u64 = 300_000;

// == Shared State ==
/// Store plus in-flight fetch handles, guarded together so the freshness
/// check and the single-flight lookup happen under one write lock.
pub(crate) struct CacheState {
    pub(crate) store: CacheStore,
    pub(crate) in_flight: HashMap<CacheKey, watch::Receiver<Option<CacheEntry>>>,
}

struct ClientInner {
    state: RwLock<CacheState>,
    observers: Arc<ObserverRegistry>,
    events: broadcast::Sender<CacheEvent>,
    staleness: StalenessPolicy,
    retry: RetryPolicy,
    invalidation: StdRwLock<InvalidationEngine>,
    clock: Arc<dyn Clock>,
    gc_time_ms: u64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

// == Query Client ==
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<ClientInner>,
}

impl QueryClient {
    pub fn builder() -> QueryClientBuilder {
        QueryClientBuilder::default()
    }

    pub fn from_config(config: &Config) -> Self {
        QueryClientBuilder::from_config(config).build()
    }

    /// Current time in milliseconds, from the client's clock.
    pub fn now(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    pub fn staleness(&self) -> &StalenessPolicy {
        &self.inner.staleness
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    fn publish(&self, event: CacheEvent) {
        // No receivers is not an error
        let _ = self.inner.events.send(event);
    }

    // == Direct Access ==
    /// Returns a copy of the entry for `key` without touching LRU order.
    pub async fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.state.read().await.store.peek(key).cloned()
    }

    pub async fn is_fetching(&self, key: &CacheKey) -> bool {
        self.inner.state.read().await.in_flight.contains_key(key)
    }

    /// Writes `value` as a fresh result, as after an optimistic update.
    pub async fn set_query_data(&self, key: &CacheKey, value: Value) -> Result<CacheEntry> {
        let entry = {
            let mut state = self.inner.state.write().await;
            let now = self.now();
            state.store.set_value(key, value, now)?
        };
        self.publish(CacheEvent::Updated {
            key: key.clone(),
            status: entry.status(),
        });
        Ok(entry)
    }

    pub async fn remove(&self, key: &CacheKey) -> Result<CacheEntry> {
        let entry = self.inner.state.write().await.store.delete(key)?;
        self.publish(CacheEvent::Removed { key: key.clone() });
        Ok(entry)
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.state.read().await.store.stats()
    }

    /// Debug dump of every entry, sorted by key.
    pub async fn snapshot(&self) -> Vec<EntrySnapshot> {
        self.inner.state.read().await.store.snapshot()
    }

    pub async fn len(&self) -> usize {
        self.inner.state.read().await.store.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // == Subscriptions ==
    /// Observes `key`. The entry is kept from garbage collection while the
    /// subscription lives.
    pub fn subscribe(&self, key: CacheKey) -> Subscription {
        Subscription::new(
            key,
            Arc::clone(&self.inner.observers),
            self.inner.events.subscribe(),
        )
    }

    pub fn observers(&self, key: &CacheKey) -> usize {
        self.inner.observers.observers(key)
    }

    // == Invalidation ==
    /// Adds a rule to the client's invalidation engine.
    pub fn register_rule(&self, rule: InvalidationRule) {
        self.inner
            .invalidation
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(rule);
    }

    pub fn rules(&self) -> Vec<InvalidationRule> {
        self.inner
            .invalidation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rules()
            .to_vec()
    }

    /// Applies every rule registered for `trigger`. Returns the affected keys.
    pub async fn invalidate(&self, trigger: &str, context: &MutationContext) -> HashSet<CacheKey> {
        let affected = {
            let mut state = self.inner.state.write().await;
            let now = self.now();
            let engine = self
                .inner
                .invalidation
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            engine.invalidate(&mut state.store, trigger, context, now)
        };
        for key in &affected {
            self.publish(CacheEvent::Invalidated { key: key.clone() });
        }
        affected
    }

    /// Marks every stored key accepted by `matcher` stale, outside any rule.
    pub async fn invalidate_matching(&self, matcher: &KeyMatcher) -> Vec<CacheKey> {
        let affected = {
            let mut state = self.inner.state.write().await;
            let now = self.now();
            state.store.mark_stale(|key| matcher.matches(key), now)
        };
        debug!(affected = affected.len(), "invalidated matching entries");
        for key in &affected {
            self.publish(CacheEvent::Invalidated { key: key.clone() });
        }
        affected
    }

    // == Mutations ==
    /// Runs a mutation and, if it succeeds, the invalidation rules for
    /// `operation`.
    ///
    /// A failed mutation leaves the store untouched.
    pub async fn mutate<T, E, Fut>(
        &self,
        operation: &str,
        context: &MutationContext,
        mutation: Fut,
    ) -> std::result::Result<T, E>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        match mutation.await {
            Ok(value) => {
                self.invalidate(operation, context).await;
                Ok(value)
            }
            Err(err) => {
                debug!(operation, "mutation failed, cache left untouched");
                Err(err)
            }
        }
    }

    // == Garbage Collection ==
    /// Removes unobserved entries untouched for the configured gc time.
    pub async fn collect_garbage(&self) -> Vec<CacheKey> {
        let removed = {
            let mut state = self.inner.state.write().await;
            let now = self.now();
            let observers = &self.inner.observers;
            state
                .store
                .remove_unobserved(|key| observers.is_observed(key), now, self.inner.gc_time_ms)
        };
        for key in &removed {
            self.publish(CacheEvent::Removed { key: key.clone() });
        }
        removed
    }

    /// Starts the periodic garbage collection task.
    ///
    /// The task holds a handle to this client until [`shutdown`](Self::shutdown).
    pub fn spawn_gc(&self, interval: Duration) {
        let handle = spawn_gc_task(self.clone(), interval);
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Aborts background tasks. Cached data stays readable.
    pub fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in &handles {
            handle.abort();
        }
        info!(tasks = handles.len(), "query client shut down");
    }
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("staleness", &self.inner.staleness)
            .field("retry", &self.inner.retry)
            .field("gc_time_ms", &self.inner.gc_time_ms)
            .finish_non_exhaustive()
    }
}

// == Builder ==
pub struct QueryClientBuilder {
    max_entries: usize,
    staleness: StalenessPolicy,
    retry: RetryPolicy,
    invalidation: InvalidationEngine,
    clock: Arc<dyn Clock>,
    gc_time_ms: u64,
}

impl Default for QueryClientBuilder {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            staleness: StalenessPolicy::default(),
            retry: RetryPolicy::default(),
            invalidation: InvalidationEngine::new(),
            clock: Arc::new(SystemClock),
            gc_time_ms: DEFAULT_GC_TIME_MS,
        }
    }
}

impl QueryClientBuilder {
    /// Builder preloaded with the store bound, policies and gc time from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_entries: config.max_entries,
            staleness: config.staleness_policy(),
            retry: RetryPolicy::new(config.retry_rule()),
            gc_time_ms: config.gc_time_ms,
            ..Self::default()
        }
    }

    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn staleness(mut self, staleness: StalenessPolicy) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn invalidation(mut self, invalidation: InvalidationEngine) -> Self {
        self.invalidation = invalidation;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn gc_time_ms(mut self, gc_time_ms: u64) -> Self {
        self.gc_time_ms = gc_time_ms;
        self
    }

    pub fn build(self) -> QueryClient {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        QueryClient {
            inner: Arc::new(ClientInner {
                state: RwLock::new(CacheState {
                    store: CacheStore::new(self.max_entries),
                    in_flight: HashMap::new(),
                }),
                observers: Arc::new(ObserverRegistry::new()),
                events,
                staleness: self.staleness,
                retry: self.retry,
                invalidation: StdRwLock::new(self.invalidation),
                clock: self.clock,
                gc_time_ms: self.gc_time_ms,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }
}
