//! Error types for the cache layer
//!
//! Fetch failures are classified so the retry policy can decide whether a
//! request is worth repeating. Store misuse gets its own error type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// == Error Class ==
/// Classification of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The resource does not exist (404). Never retried.
    NotFound,
    /// The request was rejected (4xx). Retried at most once.
    ClientError,
    /// Network failure, timeout, throttling or 5xx. Retried with backoff.
    Transient,
}

impl ErrorClass {
    /// Classifies an HTTP status code. 408 and 429 count as transient.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 | 410 => ErrorClass::NotFound,
            408 | 429 => ErrorClass::Transient,
            400..=499 => ErrorClass::ClientError,
            _ => ErrorClass::Transient,
        }
    }
}

// == Fetch Error ==
/// A failed remote call, stored in the cache entry once retries are exhausted.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{class:?} error (status {status:?}): {message}")]
pub struct FetchError {
    /// Failure classification
    pub class: ErrorClass,
    /// HTTP status code, if the transport got a response
    pub status: Option<u16>,
    /// Human-readable reason
    pub message: String,
}

impl FetchError {
    /// Builds an error from a status code, classifying it.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::from_status(status),
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::from_status(404, message)
    }

    pub fn client(status: u16, message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::ClientError,
            status: Some(status),
            message: message.into(),
        }
    }

    /// Failure without a response (connection refused, DNS, timeout).
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Transient,
            status: None,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.class == ErrorClass::NotFound
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::from_status(status.as_u16(), err.to_string()),
            None if err.is_decode() => FetchError::client(422, err.to_string()),
            None => FetchError::network(err.to_string()),
        }
    }
}

// == Cache Error Enum ==
/// Errors raised by the cache layer itself, as opposed to remote fetches.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key has no entry in the store
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Key cannot be used (empty, or malformed segments)
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Resource key belongs to a different tenant than the session
    #[error("Tenant mismatch: key {key} read by session tenant {session:?}")]
    TenantMismatch {
        key: String,
        session: Option<String>,
    },

    /// Transport could not be configured
    #[error("Transport configuration error: {0}")]
    Transport(String),

    /// Parameters could not be converted to JSON
    #[error("Invalid parameters: {0}")]
    InvalidParams(#[from] serde_json::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ErrorClass::from_status(404), ErrorClass::NotFound);
        assert_eq!(ErrorClass::from_status(400), ErrorClass::ClientError);
        assert_eq!(ErrorClass::from_status(403), ErrorClass::ClientError);
        assert_eq!(ErrorClass::from_status(429), ErrorClass::Transient);
        assert_eq!(ErrorClass::from_status(408), ErrorClass::Transient);
        assert_eq!(ErrorClass::from_status(500), ErrorClass::Transient);
        assert_eq!(ErrorClass::from_status(503), ErrorClass::Transient);
    }

    #[test]
    fn test_network_error_is_transient() {
        let err = FetchError::network("connection refused");
        assert_eq!(err.class, ErrorClass::Transient);
        assert!(err.status.is_none());
    }

    #[test]
    fn test_error_display() {
        let err = FetchError::not_found("exception EX-1 not found");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("EX-1"));
    }
}
