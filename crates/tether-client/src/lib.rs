//! # tether-client
//!
//! Client side of the remote agents API.
//!
//! Layers, innermost first:
//! - [`Transport`]: sends one attempt. [`HttpTransport`] is the reqwest
//!   implementation; the `testing` feature adds a scripted in-memory one.
//! - [`Executor`]: hard per-attempt timeout, retry with exponential backoff
//!   and jitter, `Retry-After` handling, and status classification into
//!   [`ApiError`] / [`Fetch::NotReady`].
//! - [`RequestQueue`]: priority ordering, concurrency cap, dispatch spacing,
//!   burst cooldown, and eviction of stale items.
//! - [`ApiClient`]: one typed method per endpoint.

mod agents;
mod error;
mod executor;
mod http;
mod queue;
mod request;
mod retry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agents::ApiClient;
pub use error::{ApiError, QueueError, TransportError};
pub use executor::Executor;
pub use http::{HttpTransport, RawResponse, StatusClass, Transport, classify_status};
pub use queue::{Permit, Priority, QueueLimits, QueueStats, RequestQueue};
pub use request::{ApiRequest, Fetch, Method};
pub use retry::{RateLimitTracker, RetryPolicy, jitter_unit};
