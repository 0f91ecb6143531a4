//! reqwest-backed transport.

use super::{API_KEY_HEADER, Method, RawResponse, RequestSpec, Transport, TransportError};
use crate::config::RequestOptions;
use crate::error::ConfigError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// HTTP transport for a single Redmine base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a client for `base_url` from the TLS, proxy and timeout settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if a certificate or key file cannot be read and
    /// `ConfigError::Client` if reqwest rejects the identity, CA or proxy.
    pub fn new(base_url: impl Into<String>, options: &RequestOptions) -> Result<Self, ConfigError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .user_agent(concat!("redmine-lookup/", env!("CARGO_PKG_VERSION")));

        if !options.cert.is_empty() {
            let cert = read_file(&options.cert)?;
            let identity = if options.key.is_empty() && !options.passphrase.is_empty() {
                reqwest::Identity::from_pkcs12_der(&cert, &options.passphrase)?
            } else {
                let key = read_file(&options.key)?;
                reqwest::Identity::from_pkcs8_pem(&cert, &key)?
            };
            builder = builder.identity(identity);
        }

        if !options.ca.is_empty() {
            let ca = read_file(&options.ca)?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&ca)?);
        }

        if !options.proxy.is_empty() {
            builder = builder.proxy(reqwest::Proxy::all(&options.proxy)?);
        }

        if options.reject_unauthorized == Some(false) {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.into(),
        })
    }

    /// The base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn read_file(path: &str) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(Path::new(path)).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })
}

fn map_error(error: &reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else if error.is_body() || error.is_decode() {
        TransportError::Body(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestSpec) -> Result<RawResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Put => self.client.put(&url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(key) = &request.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }

        let response = builder.send().await.map_err(|e| map_error(&e))?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| map_error(&e))?;
        debug!(status, bytes = bytes.len(), path = %request.path, "Received response");

        // Error pages are often HTML; keep them as a string instead of failing.
        let body = if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        Ok(RawResponse::new(status, body))
    }
}
