//! Garbage Collection Task
//!
//! Background task that periodically drops cache entries nobody observes.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::client::QueryClient;

/// Spawns a background task that collects unobserved entries every `interval`.
///
/// Entries are removed once no subscription observes them and they have
/// been untouched for the client's gc time. The returned handle is also
/// aborted by [`QueryClient::shutdown`] when spawned through
/// [`QueryClient::spawn_gc`].
///
/// # Example
/// ```ignore
/// let client = QueryClient::from_config(&config);
/// let gc_handle = spawn_gc_task(client.clone(), config.gc_interval());
/// // Later, during shutdown:
/// gc_handle.abort();
/// ```
pub fn spawn_gc_task(client: QueryClient, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_ms = interval.as_millis() as u64,
            "starting cache garbage collection task"
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = client.collect_garbage().await;
            if removed.is_empty() {
                debug!("gc: no unobserved entries to collect");
            } else {
                info!(removed = removed.len(), "gc: collected unobserved entries");
            }
        }
    })
}
