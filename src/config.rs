//! Configuration Module
//!
//! Loads cache and transport settings from environment variables.

use std::env;
use std::time::Duration;

use crate::cache::DEFAULT_MAX_ENTRIES;
use crate::policy::{
    RetryRule, StalenessPolicy, StalenessRule, DEFAULT_BASE_DELAY_MS,
    DEFAULT_CLIENT_ERROR_RETRIES, DEFAULT_MAX_DELAY_MS, DEFAULT_TRANSIENT_RETRIES,
};

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of entries the store can hold
    pub max_entries: usize,
    /// Staleness window in milliseconds for families without a rule
    pub default_stale_time_ms: u64,
    /// Per-family staleness overrides
    pub stale_time_overrides: Vec<StalenessRule>,
    /// How long an unobserved entry is kept, in milliseconds
    pub gc_time_ms: u64,
    /// Garbage collection task interval in seconds
    pub gc_interval: u64,
    /// Backoff base in milliseconds
    pub retry_base_ms: u64,
    /// Backoff ceiling in milliseconds
    pub retry_cap_ms: u64,
    /// Retries allowed for client errors
    pub client_error_retries: u32,
    /// Retries allowed for transient errors
    pub transient_retries: u32,
    /// Base URL of the console API
    pub api_base_url: String,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `DEFAULT_STALE_TIME_MS` - Fallback staleness window (default: 0)
    /// - `STALE_TIME_OVERRIDES` - `family=ms` pairs, comma separated (default: none)
    /// - `GC_TIME_MS` - Retention of unobserved entries (default: 300000)
    /// - `GC_INTERVAL` - Garbage collection frequency in seconds (default: 60)
    /// - `RETRY_BASE_MS` - Backoff base (default: 1000)
    /// - `RETRY_CAP_MS` - Backoff ceiling (default: 3000)
    /// - `CLIENT_ERROR_RETRIES` - Client error retries (default: 1)
    /// - `TRANSIENT_RETRIES` - Transient error retries (default: 2)
    /// - `API_BASE_URL` - Console API base URL (default: http://localhost:8000)
    /// - `REQUEST_TIMEOUT_MS` - Per-request timeout (default: 30000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: parse_env("MAX_ENTRIES").unwrap_or(defaults.max_entries),
            default_stale_time_ms: parse_env("DEFAULT_STALE_TIME_MS")
                .unwrap_or(defaults.default_stale_time_ms),
            stale_time_overrides: env::var("STALE_TIME_OVERRIDES")
                .map(|raw| parse_overrides(&raw))
                .unwrap_or(defaults.stale_time_overrides),
            gc_time_ms: parse_env("GC_TIME_MS").unwrap_or(defaults.gc_time_ms),
            gc_interval: parse_env("GC_INTERVAL").unwrap_or(defaults.gc_interval),
            retry_base_ms: parse_env("RETRY_BASE_MS").unwrap_or(defaults.retry_base_ms),
            retry_cap_ms: parse_env("RETRY_CAP_MS").unwrap_or(defaults.retry_cap_ms),
            client_error_retries: parse_env("CLIENT_ERROR_RETRIES")
                .unwrap_or(defaults.client_error_retries),
            transient_retries: parse_env("TRANSIENT_RETRIES")
                .unwrap_or(defaults.transient_retries),
            api_base_url: env::var("API_BASE_URL").unwrap_or(defaults.api_base_url),
            request_timeout_ms: parse_env("REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.request_timeout_ms),
        }
    }

    /// Default retry rule built from the retry settings.
    pub fn retry_rule(&self) -> RetryRule {
        RetryRule {
            client_error_retries: self.client_error_retries,
            transient_retries: self.transient_retries,
            base_delay_ms: self.retry_base_ms,
            max_delay_ms: self.retry_cap_ms,
        }
    }

    /// Staleness policy from the default window and the overrides.
    pub fn staleness_policy(&self) -> StalenessPolicy {
        StalenessPolicy::new(self.default_stale_time_ms)
            .with_rules(self.stale_time_overrides.iter().cloned())
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            default_stale_time_ms: 0,
            stale_time_overrides: Vec::new(),
            gc_time_ms: 300_000,
            gc_interval: 60,
            retry_base_ms: DEFAULT_BASE_DELAY_MS,
            retry_cap_ms: DEFAULT_MAX_DELAY_MS,
            client_error_retries: DEFAULT_CLIENT_ERROR_RETRIES,
            transient_retries: DEFAULT_TRANSIENT_RETRIES,
            api_base_url: "http://localhost:8000".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Parses `family=ms,family=ms`. Malformed pairs are ignored.
fn parse_overrides(raw: &str) -> Vec<StalenessRule> {
    raw.split(',')
        .filter_map(|pair| {
            let (family, ttl) = pair.split_once('=')?;
            let family = family.trim();
            let ttl_ms = ttl.trim().parse().ok()?;
            (!family.is_empty()).then(|| StalenessRule {
                family: family.to_string(),
                ttl_ms,
            })
        })
        .collect()
}
