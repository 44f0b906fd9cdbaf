//! HTTP client for the Burrow REST API
//!
//! The fetcher talks to Burrow through the [`HttpClient`] trait so tests can
//! swap in a scripted client. [`ReqwestClient`] is the production
//! implementation.

use crate::config::HttpConfig;
use crate::error::PollerError;
use crate::request::RequestDescriptor;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Certificate, Client, Proxy};
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// A successful (2xx) response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw response body
    pub body: Bytes,
}

/// Why a request failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection refused, DNS failure, TLS handshake failure
    Connect,
    /// The configured timeout elapsed
    Timeout,
    /// The server answered with a non-2xx status
    Status(u16),
    /// The response body could not be read
    Body,
    /// Any other failure while building or sending the request
    Request,
}

/// A failed request, as reported in failure records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    /// Failure category
    pub kind: TransportErrorKind,
    /// Human readable message
    pub message: String,
    /// Messages of the underlying error chain, outermost first
    pub causes: Vec<String>,
}

impl TransportError {
    /// Create an error with no cause chain
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            causes: Vec::new(),
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else if let Some(status) = err.status() {
            TransportErrorKind::Status(status.as_u16())
        } else {
            TransportErrorKind::Request
        };

        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            kind,
            message: err.to_string(),
            causes,
        }
    }
}

/// Asynchronous GET against a request descriptor.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch `request`, returning the body of a 2xx response.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] for connection failures, timeouts,
    /// unreadable bodies and non-2xx statuses.
    async fn get(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError>;
}

/// reqwest-backed [`HttpClient`]
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Build a client from the HTTP settings.
    ///
    /// # Errors
    ///
    /// Returns `PollerError::Config` if the proxy URL or CA file is invalid,
    /// and `PollerError::Http` if the client cannot be built.
    pub fn new(config: &HttpConfig) -> Result<Self, PollerError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(config.user_agent.clone());

        if let Some(proxy) = &config.proxy {
            let proxy = Proxy::all(proxy.as_str())
                .map_err(|e| PollerError::Config(format!("Invalid proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        if let Some(path) = &config.cacert {
            let pem = std::fs::read(path).map_err(|e| {
                PollerError::Config(format!("Failed to read cacert {}: {}", path.display(), e))
            })?;
            let cert = Certificate::from_pem(&pem).map_err(|e| {
                PollerError::Config(format!("Invalid cacert {}: {}", path.display(), e))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError> {
        let options = request.options();
        let mut builder = self.client.get(request.url().clone());

        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        // Basic credentials go out with the first request, never after a challenge.
        if let Some(auth) = &options.auth {
            builder = builder.basic_auth(&auth.user, Some(&auth.pass));
        }

        let response = builder.send().await.map_err(TransportError::from_reqwest)?;
        let status = response.status();
        debug!(url = %request.url(), status = status.as_u16(), "Received response");

        if !status.is_success() {
            return Err(TransportError::new(
                TransportErrorKind::Status(status.as_u16()),
                format!("HTTP {} from {}", status, request.url()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(TransportError::from_reqwest)?;

        Ok(HttpResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{normalize_request, ClientSpec};

    #[test]
    fn test_transport_error_display() {
        let error = TransportError::new(TransportErrorKind::Status(503), "HTTP 503");
        assert_eq!(error.to_string(), "HTTP 503");
        assert!(error.causes.is_empty());
    }

    #[test]
    fn test_client_builds_with_defaults() {
        assert!(ReqwestClient::new(&HttpConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_cacert_path() {
        let config = HttpConfig {
            cacert: Some("/nonexistent/ca.pem".into()),
            ..HttpConfig::default()
        };
        let result = ReqwestClient::new(&config);
        assert!(matches!(result, Err(PollerError::Config(_))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ReqwestClient::new(&HttpConfig::default()).unwrap();
        let spec = ClientSpec::Url(format!("http://127.0.0.1:{}", port));
        let request = normalize_request(&spec, "v3").unwrap();

        let error = client.get(&request).await.unwrap_err();
        assert_eq!(error.kind, TransportErrorKind::Connect);
        assert!(!error.message.is_empty());
    }
}
