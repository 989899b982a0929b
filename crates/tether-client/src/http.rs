//! Transport seam and HTTP status classification.
//!
//! The executor only sees [`RawResponse`] values, so status handling
//! (429 with `Retry-After`, auth failures, not-ready resources) is decided in
//! one place and the reqwest-backed [`HttpTransport`] stays a thin adapter.

use std::future::Future;
use std::time::Duration;

use tether_config::ApiConfig;

use crate::error::{TransportError, is_transient_status};
use crate::request::{ApiRequest, Method};

/// Status line, rate-limit hint, and body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    #[must_use]
    pub const fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// Sends a single attempt of an [`ApiRequest`]. Retries, timeouts, and
/// classification belong to the executor, not the transport.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        request: &ApiRequest,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;
}

/// How the executor should react to a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// 401/403: fatal, never retried.
    Auth,
    /// 404/409: the resource does not exist yet.
    NotReady,
    /// 429.
    RateLimited,
    /// 408/5xx.
    Transient,
    /// Anything else: reported as-is, not retried.
    Rejected,
}

#[must_use]
pub const fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        401 | 403 => StatusClass::Auth,
        404 | 409 => StatusClass::NotReady,
        429 => StatusClass::RateLimited,
        s if is_transient_status(s) => StatusClass::Transient,
        _ => StatusClass::Rejected,
    }
}

/// reqwest-backed transport carrying the API key as a bearer token.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpTransport {
    /// Build a transport from the `api` config section.
    ///
    /// No client-level timeout is set; the executor applies its own hard
    /// per-attempt timeout around [`Transport::send`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if the underlying client fails to
    /// build (e.g. an invalid `User-Agent`).
    pub fn new(config: &ApiConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.normalized_base_url().to_string(),
            api_key: config.key.trim().to_string(),
        })
    }

    fn url(&self, request: &ApiRequest) -> String {
        format!("{}{}", self.base_url, request.path_and_query())
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .http
            .request(method, self.url(request))
            .bearer_auth(&self.api_key);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();
        let retry_after = parse_retry_after(&resp);
        let body = resp.text().await.map_err(map_reqwest_error)?;

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() || error.is_request() || error.is_body() {
        TransportError::Connection(error.to_string())
    } else {
        TransportError::Request(error.to_string())
    }
}

/// Parse the `Retry-After` header as whole seconds.
///
/// Absent or unparseable values (including HTTP-date forms) yield `None`, and
/// the executor falls back to its own backoff schedule.
fn parse_retry_after(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
