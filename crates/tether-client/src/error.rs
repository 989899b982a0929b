//! Client error taxonomy.

use std::time::Duration;

use tether_core::errors::CoreError;
use thiserror::Error;

/// Failure of the transport itself, before any HTTP status was received.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established or was reset.
    #[error("connection error: {0}")]
    Connection(String),

    /// The underlying client reported a timeout.
    #[error("transport timed out")]
    Timeout,

    /// The request could not be built or sent (bad URL, invalid header, ...).
    #[error("request error: {0}")]
    Request(String),
}

impl TransportError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout)
    }
}

/// Failure of the request queue to run an item.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The item waited longer than the queue's maximum age and was evicted
    /// without executing.
    #[error("request expired after waiting {waited:?} in the queue")]
    Expired { waited: Duration },

    /// The queue was dropped while the item was waiting.
    #[error("request queue closed")]
    Closed,
}

/// Errors that can occur when talking to the remote agents API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 401/403. Never retried; the credential needs to be replaced.
    #[error("authorization failed (HTTP {status}): check the API key")]
    Auth { status: u16 },

    /// 404/409 on an endpoint whose resource is required to exist.
    #[error("resource not found: {path}")]
    NotFound { path: String },

    /// 429 after the retry budget was exhausted.
    #[error("rate limited{}", retry_after.map(|d| format!(", retry after {}s", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// The body did not match the expected schema. Never retried.
    #[error("malformed response from {path}: {message}")]
    Malformed { path: String, message: String },

    /// The hard per-attempt timeout expired on the last attempt.
    #[error("request to {path} timed out after {after:?}")]
    Timeout { path: String, after: Duration },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Any other non-success status, or a transient status (408/5xx) that
    /// persisted through every attempt.
    #[error("API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Invalid(#[from] CoreError),
}

impl ApiError {
    /// Auth failures halt polling and must be surfaced immediately.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

pub(crate) const fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 500..=599)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_message_includes_hint() {
        let error = ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert!(error.to_string().contains("retry after 30s"));
        let bare = ApiError::RateLimited { retry_after: None };
        assert_eq!(bare.to_string(), "rate limited");
    }

    #[test]
    fn transient_classification() {
        assert!(is_transient_status(503));
        assert!(is_transient_status(408));
        assert!(!is_transient_status(400));
        assert!(ApiError::Auth { status: 403 }.is_auth());
        assert!(TransportError::Timeout.is_transient());
        assert!(!TransportError::Request("bad url".into()).is_transient());
    }
}
