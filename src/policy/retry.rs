//! Retry Policy
//!
//! Decides whether a failed fetch is attempted again and how long to wait
//! first. Everything here is a pure function of its arguments.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorClass, FetchError};
use crate::key::CacheKey;

pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 3_000;
pub const DEFAULT_CLIENT_ERROR_RETRIES: u32 = 1;
pub const DEFAULT_TRANSIENT_RETRIES: u32 = 2;

// == Retry Rule ==
/// Retry budget and backoff curve.
///
/// `attempt_index` is the 0-based index of the attempt that just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRule {
    pub client_error_retries: u32,
    pub transient_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryRule {
    fn default() -> Self {
        Self {
            client_error_retries: DEFAULT_CLIENT_ERROR_RETRIES,
            transient_retries: DEFAULT_TRANSIENT_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryRule {
    /// A rule that never retries.
    pub fn none() -> Self {
        Self {
            client_error_retries: 0,
            transient_retries: 0,
            ..Self::default()
        }
    }

    /// Number of retries allowed for an error class. Not-found gets none.
    pub fn max_retries(&self, class: ErrorClass) -> u32 {
        match class {
            ErrorClass::NotFound => 0,
            ErrorClass::ClientError => self.client_error_retries,
            ErrorClass::Transient => self.transient_retries,
        }
    }

    pub fn is_retryable(&self, error: &FetchError) -> bool {
        self.max_retries(error.class) > 0
    }

    pub fn should_retry(&self, error: &FetchError, attempt_index: u32) -> bool {
        attempt_index < self.max_retries(error.class)
    }

    /// `min(base * 2^attempt_index, max)`, without jitter.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt_index).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

// == Rule Scope ==
/// What a retry override applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "name", rename_all = "snake_case")]
pub enum RuleScope {
    Family(String),
    Operation(String),
}

// == Retry Policy ==
/// Default rule plus per-family and per-operation overrides.
///
/// Operation overrides win over family overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    default: RetryRule,
    families: HashMap<String, RetryRule>,
    operations: HashMap<String, RetryRule>,
}

impl RetryPolicy {
    pub fn new(default: RetryRule) -> Self {
        Self {
            default,
            families: HashMap::new(),
            operations: HashMap::new(),
        }
    }

    pub fn with_rule(mut self, scope: RuleScope, rule: RetryRule) -> Self {
        match scope {
            RuleScope::Family(name) => self.families.insert(name, rule),
            RuleScope::Operation(name) => self.operations.insert(name, rule),
        };
        self
    }

    pub fn default_rule(&self) -> &RetryRule {
        &self.default
    }

    /// Rule governing fetches for `key`.
    pub fn rule_for(&self, key: &CacheKey) -> &RetryRule {
        key.operation()
            .and_then(|op| self.operations.get(op))
            .or_else(|| key.family().and_then(|family| self.families.get(family)))
            .unwrap_or(&self.default)
    }

    pub fn should_retry(&self, error: &FetchError, attempt_index: u32) -> bool {
        self.default.should_retry(error, attempt_index)
    }

    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        self.default.delay_for(attempt_index)
    }
}

// == Attempt State ==
/// Per-request retry state machine.
///
/// ```text
/// Idle --start--> Attempting(0) --failure, retry--> Attempting(1) ...
///                      |                                 |
///                   success                        failure, give up
///                      v                                 v
///                  Succeeded                           Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    Attempting(u32),
    Succeeded,
    Failed,
}

impl AttemptState {
    /// Begins the first attempt. Only valid from `Idle`.
    pub fn start(self) -> Self {
        match self {
            AttemptState::Idle => AttemptState::Attempting(0),
            other => other,
        }
    }

    pub fn on_success(self) -> Self {
        match self {
            AttemptState::Attempting(_) => AttemptState::Succeeded,
            other => other,
        }
    }

    /// Applies a failed attempt.
    ///
    /// Moves to the next attempt and returns the backoff to wait first, or
    /// moves to `Failed` and returns None.
    pub fn on_failure(&mut self, error: &FetchError, rule: &RetryRule) -> Option<Duration> {
        let AttemptState::Attempting(index) = *self else {
            return None;
        };
        if rule.should_retry(error, index) {
            *self = AttemptState::Attempting(index + 1);
            Some(rule.delay_for(index))
        } else {
            *self = AttemptState::Failed;
            None
        }
    }

    pub fn attempt(&self) -> Option<u32> {
        match self {
            AttemptState::Attempting(index) => Some(*index),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Succeeded | AttemptState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> FetchError {
        FetchError::from_status(503, "unavailable")
    }

    #[test]
    fn test_default_decisions() {
        let rule = RetryRule::default();
        let not_found = FetchError::not_found("missing");
        let client = FetchError::from_status(400, "bad request");

        assert!(!rule.should_retry(&not_found, 0));
        assert!(rule.should_retry(&client, 0));
        assert!(!rule.should_retry(&client, 1));
        assert!(rule.should_retry(&transient(), 0));
        assert!(rule.should_retry(&transient(), 1));
        assert!(!rule.should_retry(&transient(), 2));
    }

    #[test]
    fn test_backoff_is_capped() {
        let rule = RetryRule::default();
        assert_eq!(rule.delay_for(0), Duration::from_millis(1_000));
        assert_eq!(rule.delay_for(1), Duration::from_millis(2_000));
        assert_eq!(rule.delay_for(2), Duration::from_millis(3_000));
        assert_eq!(rule.delay_for(10), Duration::from_millis(3_000));
        assert_eq!(rule.delay_for(200), Duration::from_millis(3_000));
    }

    #[test]
    fn test_is_retryable() {
        let rule = RetryRule::default();
        assert!(!rule.is_retryable(&FetchError::not_found("x")));
        assert!(rule.is_retryable(&transient()));
        assert!(!RetryRule::none().is_retryable(&transient()));
    }

    #[test]
    fn test_rule_lookup_prefers_operation() {
        let quick = RetryRule {
            transient_retries: 5,
            ..RetryRule::default()
        };
        let policy = RetryPolicy::default()
            .with_rule(RuleScope::Family("workers".to_string()), RetryRule::none())
            .with_rule(RuleScope::Operation("health".to_string()), quick);

        let health = CacheKey::build("workers", None, "health", None);
        let list = CacheKey::build("workers", None, "list", None);
        let other = CacheKey::build("exceptions", None, "list", None);

        assert_eq!(policy.rule_for(&health), &quick);
        assert_eq!(policy.rule_for(&list), &RetryRule::none());
        assert_eq!(policy.rule_for(&other), &RetryRule::default());
    }

    #[test]
    fn test_state_machine_transient_exhaustion() {
        let rule = RetryRule::default();
        let mut state = AttemptState::Idle.start();
        assert_eq!(state.attempt(), Some(0));

        assert_eq!(state.on_failure(&transient(), &rule), Some(Duration::from_millis(1_000)));
        assert_eq!(state, AttemptState::Attempting(1));
        assert_eq!(state.on_failure(&transient(), &rule), Some(Duration::from_millis(2_000)));
        assert_eq!(state, AttemptState::Attempting(2));
        assert_eq!(state.on_failure(&transient(), &rule), None);
        assert_eq!(state, AttemptState::Failed);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_state_machine_not_found_fails_immediately() {
        let mut state = AttemptState::Idle.start();
        assert_eq!(state.on_failure(&FetchError::not_found("x"), &RetryRule::default()), None);
        assert_eq!(state, AttemptState::Failed);
    }

    #[test]
    fn test_state_machine_success() {
        let state = AttemptState::Idle.start().on_success();
        assert_eq!(state, AttemptState::Succeeded);
        assert!(state.is_terminal());
        assert_eq!(AttemptState::Idle.on_success(), AttemptState::Idle);
    }
}
