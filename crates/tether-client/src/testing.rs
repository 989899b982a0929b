//! Scripted in-memory [`Transport`] for tests.
//!
//! Each `(method, path)` route owns a queue of [`Step`]s consumed one per
//! request; the last step of a route repeats forever. Unscripted routes
//! answer 404.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::TransportError;
use crate::http::{RawResponse, Transport};
use crate::request::{ApiRequest, Method};

/// What the transport does for one request.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(RawResponse),
    Fail(TransportError),
    /// Never completes; exercises the executor's hard timeout.
    Hang,
    Delay(Duration, RawResponse),
}

impl Step {
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::Respond(RawResponse::json(status, value))
    }

    pub fn status(status: u16) -> Self {
        Self::Respond(RawResponse::new(status, ""))
    }
}

/// One request observed by the transport.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub at: Instant,
}

#[derive(Default)]
struct Script {
    routes: HashMap<(Method, String), VecDeque<Step>>,
    calls: Vec<Call>,
    active: usize,
    peak_active: usize,
}

#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `step` to the route's script.
    pub fn push(&self, method: Method, path: &str, step: Step) -> &Self {
        self.lock()
            .routes
            .entry((method, path.to_string()))
            .or_default()
            .push_back(step);
        self
    }

    pub fn push_all(
        &self,
        method: Method,
        path: &str,
        steps: impl IntoIterator<Item = Step>,
    ) -> &Self {
        for step in steps {
            self.push(method, path, step);
        }
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, method: Method, path: &str) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .cloned()
            .collect()
    }

    /// Highest number of requests that were in the transport at once.
    pub fn peak_active(&self) -> usize {
        self.lock().peak_active
    }

    fn next_step(&self, request: &ApiRequest) -> Step {
        let mut script = self.lock();
        script.calls.push(Call {
            method: request.method,
            path: request.path.clone(),
            body: request.body.clone(),
            at: Instant::now(),
        });
        script.active += 1;
        script.peak_active = script.peak_active.max(script.active);

        let key = (request.method, request.path.clone());
        match script.routes.get_mut(&key) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap_or_else(|| Step::status(404)),
            Some(steps) => steps.front().cloned().unwrap_or_else(|| Step::status(404)),
            None => Step::status(404),
        }
    }
}

struct ActiveGuard<'a>(&'a ScriptedTransport);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut script = self.0.lock();
        script.active = script.active.saturating_sub(1);
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        let step = self.next_step(request);
        let _active = ActiveGuard(self);
        match step {
            Step::Respond(response) => Ok(response),
            Step::Fail(error) => Err(error),
            Step::Hang => std::future::pending().await,
            Step::Delay(delay, response) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
        }
    }
}
