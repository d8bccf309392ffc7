//! Fetch Executor
//!
//! Read-through fetching with single-flight and retry. One fetch per key
//! runs at a time; later readers attach to it through a `watch` channel.
//! The fetch itself runs on a spawned task, so a reader going away does
//! not cancel it.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{CacheEvent, CacheState, QueryClient, Resource};
use crate::cache::CacheEntry;
use crate::error::{CacheError, FetchError, Result};
use crate::key::CacheKey;
use crate::policy::AttemptState;
use crate::session::SessionContext;
use crate::transport::Transport;

/// Outcome of a single transport attempt.
pub type FetchResult = std::result::Result<Value, FetchError>;

type Outcome = watch::Receiver<Option<CacheEntry>>;

impl QueryClient {
    // == Execute ==
    /// Fetches `key` now, ignoring freshness.
    ///
    /// If `precondition` is false the fetch function is never called and
    /// the returned entry is the stored one, or a new `Idle` entry that is
    /// not inserted. Fetch failures are reported inside the entry; `Err`
    /// only signals an unusable key.
    pub async fn execute<F, Fut, P>(&self, key: CacheKey, fetch: F, precondition: P) -> Result<CacheEntry>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchResult> + Send + 'static,
        P: FnOnce() -> bool,
    {
        if !precondition() {
            return Ok(self.unmet(&key).await);
        }

        let outcome = {
            let mut guard = self.inner.state.write().await;
            self.join_or_start(&mut guard, key.clone(), fetch)?
        };
        self.await_outcome(outcome, &key).await
    }

    // == Read ==
    /// Returns the cached entry if it is fresh, otherwise fetches it.
    pub async fn read<F, Fut, P>(&self, key: CacheKey, fetch: F, precondition: P) -> Result<CacheEntry>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchResult> + Send + 'static,
        P: FnOnce() -> bool,
    {
        if !precondition() {
            return Ok(self.unmet(&key).await);
        }

        let outcome = {
            let mut guard = self.inner.state.write().await;
            let now = self.now();
            let staleness = &self.inner.staleness;
            let fresh = guard
                .store
                .get(&key)
                .filter(|entry| staleness.is_fresh(entry, now))
                .cloned();

            if let Some(entry) = fresh {
                guard.store.stats_mut().record_hit();
                debug!(key = %key, "cache hit");
                return Ok(entry);
            }
            guard.store.stats_mut().record_miss();
            self.join_or_start(&mut guard, key.clone(), fetch)?
        };
        self.await_outcome(outcome, &key).await
    }

    /// Reads a resource through `transport` on behalf of `session`.
    ///
    /// Every attempt sends the same session. A tenant-scoped resource keyed
    /// for another tenant is rejected with [`CacheError::TenantMismatch`].
    pub async fn fetch_resource(
        &self,
        transport: Arc<dyn Transport>,
        session: &SessionContext,
        resource: &Resource,
    ) -> Result<CacheEntry> {
        let snapshot = session.clone();
        self.fetch_resource_with(transport, move || snapshot.clone(), resource)
            .await
    }

    /// Like [`fetch_resource`](Self::fetch_resource), but reads the session
    /// again before every attempt, so a retry sends context that arrived
    /// after the first attempt failed.
    pub async fn fetch_resource_live(
        &self,
        transport: Arc<dyn Transport>,
        session: watch::Receiver<SessionContext>,
        resource: &Resource,
    ) -> Result<CacheEntry> {
        self.fetch_resource_with(transport, move || session.borrow().clone(), resource)
            .await
    }

    async fn fetch_resource_with<S>(
        &self,
        transport: Arc<dyn Transport>,
        session: S,
        resource: &Resource,
    ) -> Result<CacheEntry>
    where
        S: Fn() -> SessionContext + Send + Sync + 'static,
    {
        let current = session();
        if !resource.serves_tenant(&current) {
            warn!(
                key = %resource.key,
                tenant = ?current.tenant(),
                "resource keyed for another tenant"
            );
            return Err(CacheError::TenantMismatch {
                key: resource.key.to_string(),
                session: current.tenant_id.clone(),
            });
        }

        let ready = resource.is_ready(&current);
        let target = resource.clone();
        let fetch = move || {
            let transport = Arc::clone(&transport);
            let session = session();
            // The session tenant can change between attempts.
            let request = if target.serves_tenant(&session) {
                Ok(target.request_for(&session))
            } else {
                Err(FetchError::client(403, "session tenant changed during fetch"))
            };
            async move {
                match request {
                    Ok(request) => transport.get(&request).await,
                    Err(error) => Err(error),
                }
            }
        };
        self.read(resource.key.clone(), fetch, move || ready).await
    }

    async fn unmet(&self, key: &CacheKey) -> CacheEntry {
        debug!(key = %key, "precondition unmet, fetch skipped");
        let state = self.inner.state.read().await;
        state
            .store
            .peek(key)
            .cloned()
            .unwrap_or_else(|| CacheEntry::idle(key.clone(), self.now()))
    }

    // == Single Flight ==
    /// Attaches to the fetch in flight for `key`, or starts one.
    ///
    /// Must be called with the state write lock held.
    fn join_or_start<F, Fut>(&self, state: &mut CacheState, key: CacheKey, fetch: F) -> Result<Outcome>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        if let Some(outcome) = state.in_flight.get(&key) {
            // A closed channel means the fetch task died; start over.
            if outcome.has_changed().is_ok() {
                state.store.stats_mut().record_coalesced();
                debug!(key = %key, "joined fetch in flight");
                return Ok(outcome.clone());
            }
        }

        let entry = state.store.begin_fetch(&key, self.now())?;
        let (sender, outcome) = watch::channel(None);
        state.in_flight.insert(key.clone(), outcome.clone());
        debug!(key = %key, status = ?entry.status(), "fetch started");
        self.publish(CacheEvent::Updated {
            key: key.clone(),
            status: entry.status(),
        });

        let client = self.clone();
        tokio::spawn(async move { client.run_fetch(key, fetch, sender).await });
        Ok(outcome)
    }

    async fn await_outcome(&self, mut outcome: Outcome, key: &CacheKey) -> Result<CacheEntry> {
        let settled = match outcome.wait_for(Option::is_some).await {
            Ok(entry) => (*entry).clone(),
            Err(_) => None,
        };
        match settled {
            Some(entry) => Ok(entry),
            None => self.abandon(key).await,
        }
    }

    /// Records a failure for a fetch whose task ended without reporting.
    async fn abandon(&self, key: &CacheKey) -> Result<CacheEntry> {
        warn!(key = %key, "fetch task ended without a result");
        let mut guard = self.inner.state.write().await;
        let state = &mut *guard;
        let closed = state
            .in_flight
            .get(key)
            .map_or(false, |outcome| outcome.has_changed().is_err());
        if closed {
            state.in_flight.remove(key);
        }
        state.store.fail(
            key,
            FetchError::network("fetch task ended without a result"),
            self.now(),
        )
    }

    // == Fetch Task ==
    /// Drives the attempt state machine, then writes and publishes the result.
    async fn run_fetch<F, Fut>(self, key: CacheKey, fetch: F, sender: watch::Sender<Option<CacheEntry>>)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        let rule = *self.inner.retry.rule_for(&key);
        let mut attempt = AttemptState::Idle.start();
        let mut last: Option<FetchResult> = None;

        while let Some(index) = attempt.attempt() {
            if index > 0 {
                self.inner.state.write().await.store.stats_mut().record_retry();
            }
            match fetch().await {
                Ok(value) => {
                    attempt = attempt.on_success();
                    last = Some(Ok(value));
                }
                Err(error) => {
                    match attempt.on_failure(&error, &rule) {
                        Some(delay) => {
                            debug!(
                                key = %key,
                                attempt = index,
                                class = ?error.class,
                                delay_ms = delay.as_millis() as u64,
                                "fetch attempt failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => warn!(
                            key = %key,
                            attempts = index + 1,
                            error = %error,
                            "fetch failed"
                        ),
                    }
                    last = Some(Err(error));
                }
            }
        }

        let result = last.unwrap_or_else(|| Err(FetchError::network("fetch made no attempt")));
        let written = {
            let mut guard = self.inner.state.write().await;
            let state = &mut *guard;
            state.in_flight.remove(&key);
            let now = self.now();
            match result {
                Ok(value) => state.store.resolve(&key, value, now),
                Err(error) => state.store.fail(&key, error, now),
            }
        };

        match written {
            Ok(entry) => {
                debug!(key = %key, status = ?entry.status(), "fetch settled");
                self.publish(CacheEvent::Updated {
                    key,
                    status: entry.status(),
                });
                sender.send_replace(Some(entry));
            }
            Err(err) => warn!(key = %key, error = %err, "fetch result could not be stored"),
        }
    }
}
