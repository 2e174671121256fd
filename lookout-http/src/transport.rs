//! The opaque network seam under [`crate::HttpClient`].
//!
//! A [`Transport`] performs exactly one round trip and never retries. The
//! production implementation is [`ReqwestTransport`]; tests script responses.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;

/// A fully prepared request. Auth and query parameters are already applied.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Response with no headers.
    pub fn with_body(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::new(status, HeaderMap::new(), body)
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Network-level failure: connect, TLS, timeout, or a broken body stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    /// Whether the failure text reports rate-limit exhaustion.
    pub fn is_rate_limit_signal(&self) -> bool {
        let lower = self.0.to_ascii_lowercase();
        lower.contains("429") || lower.contains("rate limit")
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    inner: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, req: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let resp = self
            .inner
            .request(req.method.clone(), req.url.clone())
            .headers(req.headers.clone())
            .timeout(req.timeout)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_signal_is_case_insensitive() {
        assert!(TransportError("upstream said 429".into()).is_rate_limit_signal());
        assert!(TransportError("Rate Limit exhausted".into()).is_rate_limit_signal());
        assert!(!TransportError("connection reset by peer".into()).is_rate_limit_signal());
    }
}
