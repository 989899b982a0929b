//! Single-request executor: hard timeout, retry with backoff, and mapping of
//! transport and status outcomes onto [`ApiError`].

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::http::{RawResponse, StatusClass, Transport, classify_status};
use crate::request::{ApiRequest, Fetch};
use crate::retry::{RateLimitTracker, RetryPolicy, jitter_unit};

/// What to do after one attempt.
enum Step {
    Done(Result<Fetch<String>, ApiError>),
    Retry { error: ApiError, delay: Duration },
}

/// Runs one logical operation against a [`Transport`].
///
/// Holds no per-request state; the only side effect besides the network call
/// is recording 429s in the shared [`RateLimitTracker`].
pub struct Executor<T> {
    transport: Arc<T>,
    policy: RetryPolicy,
    rate_limits: RateLimitTracker,
}

impl<T: Transport> Executor<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self::with_shared_transport(Arc::new(transport), policy)
    }

    pub fn with_shared_transport(transport: Arc<T>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            rate_limits: RateLimitTracker::default(),
        }
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub const fn rate_limits(&self) -> &RateLimitTracker {
        &self.rate_limits
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Execute and parse the JSON body into `R`.
    ///
    /// # Errors
    ///
    /// Returns the typed [`ApiError`] for the final attempt; a body that does
    /// not parse as `R` yields [`ApiError::Malformed`] without retrying.
    pub async fn execute<R: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<Fetch<R>, ApiError> {
        match self.execute_raw(request).await? {
            Fetch::NotReady => Ok(Fetch::NotReady),
            Fetch::Ready(body) => {
                // A body the caller does not want parses as JSON `null`, which
                // deserializes into `()` or `Option<_>`.
                let body = if request.expects_json { body.as_str() } else { "null" };
                parse_body::<R>(request, body).map(Fetch::Ready)
            }
        }
    }

    /// Execute with retries and return the raw success body.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`]; this variant never returns `Malformed`.
    pub async fn execute_raw(&self, request: &ApiRequest) -> Result<Fetch<String>, ApiError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            debug!(
                method = %request.method,
                path = %request.path,
                attempt,
                "sending request"
            );

            let step = match tokio::time::timeout(
                self.policy.timeout,
                self.transport.send(request),
            )
            .await
            {
                Err(_) => self.transient(
                    attempt,
                    ApiError::Timeout {
                        path: request.path.clone(),
                        after: self.policy.timeout,
                    },
                ),
                Ok(Err(error)) if error.is_transient() => self.transient(attempt, error.into()),
                Ok(Err(error)) => Step::Done(Err(error.into())),
                Ok(Ok(response)) => self.on_response(attempt, response),
            };

            match step {
                Step::Done(result) => return result,
                Step::Retry { error, delay } => {
                    warn!(
                        method = %request.method,
                        path = %request.path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn on_response(&self, attempt: u32, response: RawResponse) -> Step {
        let RawResponse {
            status,
            retry_after,
            body,
        } = response;

        match classify_status(status) {
            StatusClass::Success => Step::Done(Ok(Fetch::Ready(body))),
            StatusClass::NotReady => Step::Done(Ok(Fetch::NotReady)),
            StatusClass::Auth => Step::Done(Err(ApiError::Auth { status })),
            StatusClass::Rejected => Step::Done(Err(ApiError::Status { status, body })),
            StatusClass::RateLimited => {
                self.rate_limits.record();
                let error = ApiError::RateLimited { retry_after };
                if !self.policy.has_attempts_left(attempt) {
                    return Step::Done(Err(error));
                }
                let delay = match retry_after {
                    // Sleeping here would pin a queue slot for the whole hint.
                    Some(hint) if hint > self.policy.max_delay => {
                        debug!(
                            retry_after_ms = hint.as_millis() as u64,
                            max_delay_ms = self.policy.max_delay.as_millis() as u64,
                            "rate limit hint exceeds max delay; not retrying"
                        );
                        return Step::Done(Err(error));
                    }
                    Some(hint) => hint,
                    None => self.policy.backoff_delay(attempt, jitter_unit()),
                };
                Step::Retry { error, delay }
            }
            StatusClass::Transient => self.transient(attempt, ApiError::Status { status, body }),
        }
    }

    fn transient(&self, attempt: u32, error: ApiError) -> Step {
        if self.policy.has_attempts_left(attempt) {
            Step::Retry {
                error,
                delay: self.policy.backoff_delay(attempt, jitter_unit()),
            }
        } else {
            Step::Done(Err(error))
        }
    }
}

fn parse_body<R: DeserializeOwned>(request: &ApiRequest, body: &str) -> Result<R, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Malformed {
        path: request.path.clone(),
        message: e.to_string(),
    })
}
