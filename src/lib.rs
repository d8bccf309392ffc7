//! Console Cache - tenant-scoped read-through cache for the operator console
//!
//! Caches remote query results under hierarchical keys, deduplicates
//! concurrent fetches, retries failures by class, tracks per-family
//! staleness and invalidates entries when mutations succeed.

pub mod cache;
pub mod catalog;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod key;
pub mod policy;
pub mod session;
pub mod tasks;
pub mod telemetry;
pub mod transport;

pub use cache::{CacheEntry, EntryStatus};
pub use client::{CacheEvent, QueryClient, QueryClientBuilder, Resource, Subscription};
pub use config::Config;
pub use error::{CacheError, ErrorClass, FetchError, Result};
pub use invalidation::{InvalidationRule, MutationContext};
pub use key::{CacheKey, KeyFactory, Params};
pub use session::{Precondition, SessionContext};
pub use tasks::spawn_gc_task;
pub use transport::{HttpTransport, Transport, TransportRequest};
