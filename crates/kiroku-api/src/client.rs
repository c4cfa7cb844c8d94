use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Method;
use serde::de::DeserializeOwned;
use sysinfo::System;
use url::Url;

use crate::auth::AuthContext;
use crate::error::{ApiError, ApiResult, ErrorKind};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportFailure};

/// How much of an error body ends up in [`ApiError::message`].
const ERROR_BODY_LIMIT: usize = 200;

// ── Client identity ─────────────────────────────────────────────

/// Fields rendered into the `User-Agent` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub app_name: String,
    pub app_version: String,
    pub bundle_id: String,
    pub build: String,
    pub platform: String,
    pub os_version: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            app_name: "Kiroku".into(),
            app_version: env!("CARGO_PKG_VERSION").into(),
            bundle_id: "app.kiroku".into(),
            build: "1".into(),
            platform: std::env::consts::OS.into(),
            os_version: System::os_version().unwrap_or_else(|| "unknown".into()),
        }
    }
}

impl ClientIdentity {
    /// `<app>/<version> (<bundleId>; build:<build>; <platform> <osVersion>) <product>`
    pub fn user_agent(&self, product: &str) -> String {
        format!(
            "{}/{} ({}; build:{}; {} {}) {product}",
            self.app_name,
            self.app_version,
            self.bundle_id,
            self.build,
            self.platform,
            self.os_version,
        )
    }
}

// ── Requests ────────────────────────────────────────────────────

/// Payload of a request, which also decides its `Content-Type`.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

impl RequestBody {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json(_) => "application/json",
            Self::Form(_) => "application/x-www-form-urlencoded",
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            Self::Json(value) => value.to_string().into_bytes(),
            Self::Form(pairs) => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish()
                .into_bytes(),
        }
    }
}

/// One logical request relative to the client's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Unencoded path segments, appended to the base URL path.
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl ApiRequest {
    /// Request for a literal path such as `/shows/trending`.
    pub fn new(method: Method, path: &str) -> Self {
        Self::from_segments(
            method,
            path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect(),
        )
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn from_segments(method: Method, segments: Vec<String>) -> Self {
        Self {
            method,
            segments,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn form(mut self, pairs: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(pairs));
        self
    }

    fn display_path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

// ── Authenticated client ────────────────────────────────────────

/// Authenticated JSON client over an [`HttpTransport`].
///
/// Every request carries `Accept`, `User-Agent`, a body-derived
/// `Content-Type`, and `Authorization` when the shared [`AuthContext`] holds a
/// token. Every outcome, including connection failures, comes back as an
/// [`ApiResult`].
pub struct ApiClient<H> {
    base_url: Url,
    transport: H,
    auth: AuthContext,
    identity: ClientIdentity,
    auth_scheme: Option<String>,
}

impl<H: HttpTransport> ApiClient<H> {
    pub fn new(base_url: Url, transport: H, auth: AuthContext) -> Self {
        Self {
            base_url,
            transport,
            auth,
            identity: ClientIdentity::default(),
            auth_scheme: None,
        }
    }

    pub fn with_identity(mut self, identity: ClientIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Prefix the token with a scheme, e.g. `Bearer`. Without one the raw
    /// token is sent.
    pub fn with_auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        let scheme = scheme.into();
        self.auth_scheme = (!scheme.trim().is_empty()).then_some(scheme);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub fn transport(&self) -> &H {
        &self.transport
    }

    pub fn user_agent(&self) -> String {
        self.identity.user_agent(H::PRODUCT)
    }

    /// Perform the request and classify the HTTP status.
    pub async fn send(&self, request: ApiRequest) -> ApiResult<HttpResponse> {
        let path = request.display_path();
        let http_request = self.build(request)?;
        let method = http_request.method.clone();
        tracing::debug!(%method, %path, "dispatching request");

        let resp = self
            .transport
            .send(http_request)
            .await
            .map_err(|failure| {
                tracing::warn!(%method, %path, error = %failure, "transport failure");
                match failure {
                    TransportFailure::Timeout(msg) => ApiError::new(ErrorKind::Timeout, msg),
                    TransportFailure::Network(msg) => ApiError::new(ErrorKind::Network, msg),
                }
            })?;

        if resp.is_success() {
            Ok(resp)
        } else {
            let status = resp.status;
            tracing::warn!(%method, %path, status, "API error");
            Err(ApiError::http(status, resp.body_snippet(ERROR_BODY_LIMIT)))
        }
    }

    /// Perform the request and decode a 2xx body as `T`.
    pub async fn request_json<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<T> {
        let resp = self.send(request).await?;
        serde_json::from_slice(&resp.body).map_err(|e| {
            tracing::warn!(status = resp.status, error = %e, "failed to decode response body");
            ApiError::decode(resp.status, e.to_string())
        })
    }

    fn build(&self, request: ApiRequest) -> ApiResult<HttpRequest> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ApiError::new(ErrorKind::Unknown, format!("base URL cannot hold a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(&request.segments);
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(header::USER_AGENT, header_value(&self.user_agent())?);
        if let Some(body) = &request.body {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(body.content_type()));
        }
        // Snapshot taken now; a later logout does not affect this request.
        if let Some(token) = self.auth.token() {
            let value = match &self.auth_scheme {
                Some(scheme) => format!("{scheme} {token}"),
                None => token,
            };
            let mut value = header_value(&value)?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        Ok(HttpRequest {
            method: request.method,
            url,
            headers,
            body: request.body.as_ref().map(RequestBody::encode),
        })
    }
}

fn header_value(value: &str) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ApiError::new(ErrorKind::Unknown, format!("invalid header value: {e}")))
}
