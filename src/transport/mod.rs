//! Transport Module
//!
//! The remote-call seam. The cache only needs "fetch this, give me JSON or
//! a status-coded error"; [`HttpTransport`] provides that over reqwest.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FetchError;
use crate::key::Params;
use crate::session::SessionContext;

pub use http::HttpTransport;

// == Transport Request ==
/// A GET against the console API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportRequest {
    /// Path below the API base URL, e.g. `/api/v1/exceptions`
    pub path: String,
    /// Query string parameters
    #[serde(default)]
    pub query: Params,
    /// Session the request is made for
    #[serde(default)]
    pub session: SessionContext,
}

impl TransportRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Params::new(),
            session: SessionContext::default(),
        }
    }

    pub fn with_query(mut self, query: Params) -> Self {
        self.query = query;
        self
    }

    pub fn with_session(mut self, session: SessionContext) -> Self {
        self.session = session;
        self
    }
}

// == Transport Trait ==
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs the request, resolving to the decoded JSON body.
    async fn get(&self, request: &TransportRequest) -> Result<Value, FetchError>;
}
