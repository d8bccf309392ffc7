//! Policy Module
//!
//! Pure decision tables consulted by the read path: when a cached value is
//! still fresh, and when a failed fetch is retried.

mod retry;
mod staleness;

pub use retry::{
    AttemptState, RetryPolicy, RetryRule, RuleScope, DEFAULT_BASE_DELAY_MS,
    DEFAULT_CLIENT_ERROR_RETRIES, DEFAULT_MAX_DELAY_MS, DEFAULT_TRANSIENT_RETRIES,
};
pub use staleness::{StalenessPolicy, StalenessRule};
