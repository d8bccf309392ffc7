//! HTTP Transport
//!
//! reqwest-backed [`Transport`] for the console REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use tracing::debug;

use super::{Transport, TransportRequest};
use crate::config::Config;
use crate::error::{CacheError, FetchError, Result};
use crate::key::Params;

const TENANT_HEADER: &str = "x-tenant-id";

// == HTTP Transport ==
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.api_base_url.clone(),
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

/// Builds auth and tenant headers for a request's session.
fn session_headers(request: &TransportRequest) -> std::result::Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();
    if let Some(credential) = &request.session.credential {
        let value = HeaderValue::from_str(&format!("Bearer {}", credential))
            .map_err(|e| FetchError::client(400, format!("invalid credential header: {}", e)))?;
        headers.insert(AUTHORIZATION, value);
    }
    if let Some(tenant) = request.session.tenant() {
        let value = HeaderValue::from_str(tenant)
            .map_err(|e| FetchError::client(400, format!("invalid tenant header: {}", e)))?;
        headers.insert(HeaderName::from_static(TENANT_HEADER), value);
    }
    Ok(headers)
}

/// Flattens params into query pairs.
///
/// Arrays become repeated keys; nested objects are sent as JSON text.
fn query_pairs(params: &Params) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (name, value) in params.as_map() {
        match value {
            Value::Array(items) => {
                for item in items {
                    pairs.push((name.clone(), scalar_text(item)));
                }
            }
            other => pairs.push((name.clone(), scalar_text(other))),
        }
    }
    pairs
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, request: &TransportRequest) -> std::result::Result<Value, FetchError> {
        let url = self.url(&request.path);
        let headers = session_headers(request)?;

        let mut builder = self.client.get(&url).headers(headers);
        if !request.query.is_empty() {
            builder = builder.query(&query_pairs(&request.query));
        }

        let response = builder.send().await?;
        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "transport response");

        if status.is_success() {
            if status.as_u16() == 204 {
                return Ok(Value::Null);
            }
            return Ok(response.json::<Value>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.to_string()
        } else {
            body
        };
        Err(FetchError::from_status(status.as_u16(), message))
    }
}
