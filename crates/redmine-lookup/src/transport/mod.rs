//! Transport abstraction for the Redmine REST API.
//!
//! A [`Transport`] performs exactly one request and reports what came back.
//! It never retries and never interprets status codes; [`execute`] compares
//! the received status against the expected ones and hands mismatches to the
//! error classifier.
//!
//! Two implementations are provided:
//!
//! - [`http::HttpTransport`]: reqwest-based client honoring TLS, proxy and
//!   timeout settings
//! - [`in_memory::InMemoryTracker`]: a process-local fake tracker used by the
//!   tests and by the CLI's `--demo` mode
//!
//! # Timeouts
//!
//! Nothing above this layer enforces a deadline. A transport that never
//! answers hangs the calling operation, so the socket timeout must be set
//! here (see [`crate::config::RequestOptions::timeout_secs`]).

use crate::classify;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub mod http;
pub mod in_memory;

/// Header carrying the Redmine API key.
pub const API_KEY_HEADER: &str = "X-Redmine-API-Key";

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Read
    Get,
    /// Replace/update
    Put,
}

impl Method {
    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to issue one request.
///
/// `path` is relative to the configured base URL and starts with `/`.
#[derive(Clone, PartialEq)]
pub struct RequestSpec {
    /// HTTP method
    pub method: Method,

    /// Path relative to the base URL
    pub path: String,

    /// Query string parameters, in order
    pub query: Vec<(String, String)>,

    /// JSON request body
    pub body: Option<Value>,

    /// API key sent as [`API_KEY_HEADER`]; `None` means anonymous
    pub api_key: Option<String>,
}

impl RequestSpec {
    /// A `GET` request for `path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
            api_key: None,
        }
    }

    /// A `PUT` request for `path` with a JSON body.
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
            api_key: None,
        }
    }

    /// Append a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach an API key. Empty keys are ignored, leaving the request anonymous.
    #[must_use]
    pub fn api_key(mut self, key: &str) -> Self {
        self.api_key = (!key.is_empty()).then(|| key.to_string());
        self
    }

    /// Value of a query parameter, if present.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

// Hand-written so API keys never reach logs.
impl fmt::Debug for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSpec")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("body", &self.body)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Status code and parsed body of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,

    /// Parsed JSON body, `Value::Null` when empty
    pub body: Value,
}

impl RawResponse {
    /// Create a response.
    #[must_use]
    pub const fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

/// The request failed before a response was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// DNS, TCP or TLS connection failure.
    #[error("connection failed: {0}")]
    Connect(String),

    /// No response within the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The response body could not be read or parsed.
    #[error("invalid response body: {0}")]
    Body(String),

    /// Any other client-side failure.
    #[error("request failed: {0}")]
    Other(String),
}

/// Executes single requests against the tracker.
///
/// Implementations must be `Send + Sync` so one transport can be shared by
/// every concurrent lookup.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return whatever the server answered.
    ///
    /// Non-2xx responses are **not** errors at this level.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] only when no response was received.
    async fn send(&self, request: &RequestSpec) -> std::result::Result<RawResponse, TransportError>;
}

/// Send `request` and require one of the `expected` status codes.
///
/// # Errors
///
/// - [`crate::error::ErrorKind::TransportFailure`] when no response arrived
/// - [`crate::error::ErrorKind::Unauthorized`], [`crate::error::ErrorKind::NotFound`]
///   or [`crate::error::ErrorKind::UnexpectedStatus`] when the status is not expected
pub async fn execute(
    transport: &dyn Transport,
    request: &RequestSpec,
    expected: &[u16],
) -> Result<Value> {
    tracing::debug!(request = ?request, "Request Options");

    match transport.send(request).await {
        Err(error) => {
            tracing::error!(%error, method = %request.method, path = %request.path, "Error making HTTP request");
            Err(classify::transport_failure(request, &error))
        }
        Ok(response) if expected.contains(&response.status) => Ok(response.body),
        Ok(response) => Err(classify::unexpected_response(request, expected, response)),
    }
}
