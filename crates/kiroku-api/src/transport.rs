//! The raw HTTP seam beneath [`ApiClient`](crate::client::ApiClient).
//!
//! [`HttpTransport`] moves bytes and reports connection-level failures only;
//! status codes and body decoding are classified one layer up.

use std::future::Future;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use thiserror::Error;
use url::Url;

/// A fully-built request ready to go on the wire.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// Status, headers and body of a completed exchange, whatever the status.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text for error messages, cut to `limit` characters.
    pub fn body_snippet(&self, limit: usize) -> String {
        let text = String::from_utf8_lossy(&self.body);
        match text.char_indices().nth(limit) {
            Some((idx, _)) => format!("{}…", &text[..idx]),
            None => text.into_owned(),
        }
    }
}

/// The request never produced an HTTP response.
#[derive(Debug, Clone, Error)]
pub enum TransportFailure {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Network(String),
}

/// Something that can execute an [`HttpRequest`].
pub trait HttpTransport: Send + Sync {
    /// `<name>/<version>` appended to the User-Agent.
    const PRODUCT: &'static str;

    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportFailure>> + Send;
}

// ── reqwest adapter ─────────────────────────────────────────────

/// [`HttpTransport`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    /// Build a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    fn map_error(error: reqwest::Error) -> TransportFailure {
        if error.is_timeout() {
            TransportFailure::Timeout(error.to_string())
        } else {
            TransportFailure::Network(error.to_string())
        }
    }
}

impl HttpTransport for ReqwestTransport {
    const PRODUCT: &'static str = "reqwest/0.12";

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        let mut builder = self
            .http
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await.map_err(Self::map_error)?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(Self::map_error)?.to_vec();

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

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HeaderMap::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_success_range() {
        assert!(response(200, "").is_success());
        assert!(response(204, "").is_success());
        assert!(!response(301, "").is_success());
        assert!(!response(404, "").is_success());
    }

    #[test]
    fn test_body_snippet_truncates_on_char_boundary() {
        let resp = response(500, "葬送のフリーレン");
        assert_eq!(resp.body_snippet(2), "葬送…");
        assert_eq!(resp.body_snippet(100), "葬送のフリーレン");
    }
}
