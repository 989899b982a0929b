//! Typed endpoints of the remote agents API.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tether_config::TetherConfig;
use tether_core::entities::{Account, Agent, Message, validate_agent_id};
use tether_core::errors::CoreError;
use tether_core::requests::{FollowUpRequest, LaunchAgentRequest, Prompt};
use tether_core::responses::{AgentIdResponse, AgentList, Conversation, RepositoryList};

use crate::error::{ApiError, TransportError};
use crate::executor::Executor;
use crate::http::{HttpTransport, Transport};
use crate::queue::{Priority, QueueLimits, RequestQueue};
use crate::request::{ApiRequest, Fetch};
use crate::retry::{RateLimitTracker, RetryPolicy};

/// Client for the agents API. Every call goes through the owned
/// [`RequestQueue`] and then the retrying [`Executor`].
///
/// Clones share the executor, the queue, and the rate-limit tracker, so one
/// client per sync session keeps that session's request budget in one place.
pub struct ApiClient<T = HttpTransport> {
    executor: Arc<Executor<T>>,
    queue: RequestQueue,
}

impl<T> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            queue: self.queue.clone(),
        }
    }
}

impl ApiClient<HttpTransport> {
    /// Build a reqwest-backed client from the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if the HTTP client cannot be built.
    pub fn from_config(config: &TetherConfig) -> Result<Self, TransportError> {
        Ok(Self::new(
            HttpTransport::new(&config.api)?,
            RetryPolicy::from(&config.executor),
            QueueLimits::from(&config.queue),
        ))
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, policy: RetryPolicy, limits: QueueLimits) -> Self {
        Self {
            executor: Arc::new(Executor::new(transport, policy)),
            queue: RequestQueue::new(limits),
        }
    }

    pub const fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn rate_limits(&self) -> &RateLimitTracker {
        self.executor.rate_limits()
    }

    pub fn transport(&self) -> &T {
        self.executor.transport()
    }

    /// Queue `request` at `priority` and execute it.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`] from the executor, or [`ApiError::Queue`] if the item
    /// was evicted before it ran.
    pub async fn send<R: DeserializeOwned>(
        &self,
        priority: Priority,
        request: ApiRequest,
    ) -> Result<Fetch<R>, ApiError> {
        let executor = &self.executor;
        self.queue
            .run(priority, || executor.execute::<R>(&request))
            .await?
    }

    async fn send_required<R: DeserializeOwned>(
        &self,
        priority: Priority,
        request: ApiRequest,
    ) -> Result<R, ApiError> {
        let path = request.path.clone();
        self.send(priority, request).await?.require(&path)
    }

    // ── Account ────────────────────────────────────────────────────

    /// `GET /v0/me`: validates the key.
    pub async fn me(&self) -> Result<Account, ApiError> {
        self.send_required(Priority::BACKGROUND, ApiRequest::get("/v0/me"))
            .await
    }

    pub async fn repositories(&self) -> Result<RepositoryList, ApiError> {
        self.send_required(Priority::BACKGROUND, ApiRequest::get("/v0/repositories"))
            .await
    }

    // ── Agents ─────────────────────────────────────────────────────

    pub async fn list_agents(
        &self,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<AgentList, ApiError> {
        let mut request = ApiRequest::get("/v0/agents");
        if let Some(limit) = limit {
            request = request.with_query("limit", limit);
        }
        if let Some(cursor) = cursor {
            request = request.with_query("cursor", cursor);
        }
        self.send_required(Priority::BACKGROUND, request).await
    }

    /// Current status and summary of one agent.
    pub async fn agent(&self, id: &str) -> Result<Agent, ApiError> {
        let id = validate_agent_id(id)?;
        self.send_required(Priority::STATUS, ApiRequest::get(format!("/v0/agents/{id}")))
            .await
    }

    /// Conversation of one agent. A conversation that does not exist yet is
    /// an empty list, not an error.
    pub async fn conversation(&self, id: &str) -> Result<Vec<Message>, ApiError> {
        let id = validate_agent_id(id)?;
        let fetch: Fetch<Conversation> = self
            .send(
                Priority::CONVERSATION,
                ApiRequest::get(format!("/v0/agents/{id}/conversation")),
            )
            .await?;
        Ok(fetch.map(|c| c.messages).unwrap_or_default())
    }

    pub async fn launch(&self, request: &LaunchAgentRequest) -> Result<Agent, ApiError> {
        let body = to_body(request)?;
        self.send_required(Priority::USER_ACTION, ApiRequest::post("/v0/agents", body))
            .await
    }

    pub async fn follow_up(&self, id: &str, prompt: Prompt) -> Result<AgentIdResponse, ApiError> {
        let id = validate_agent_id(id)?;
        let body = to_body(&FollowUpRequest { prompt })?;
        self.send_required(
            Priority::USER_ACTION,
            ApiRequest::post(format!("/v0/agents/{id}/followup"), body),
        )
        .await
    }

    pub async fn stop(&self, id: &str) -> Result<AgentIdResponse, ApiError> {
        let id = validate_agent_id(id)?;
        self.send_required(
            Priority::USER_ACTION,
            ApiRequest::post(format!("/v0/agents/{id}/stop"), serde_json::json!({})),
        )
        .await
    }

    pub async fn delete(&self, id: &str) -> Result<AgentIdResponse, ApiError> {
        let id = validate_agent_id(id)?;
        self.send_required(
            Priority::USER_ACTION,
            ApiRequest::delete(format!("/v0/agents/{id}")),
        )
        .await
    }
}

fn to_body(value: &impl serde::Serialize) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(value).map_err(|e| CoreError::Validation(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::http::RawResponse;
    use crate::request::Method;
    use crate::testing::{ScriptedTransport, Step};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tether_core::requests::LaunchSource;

    fn client(transport: ScriptedTransport) -> ApiClient<ScriptedTransport> {
        ApiClient::new(transport, RetryPolicy::default(), QueueLimits::default())
    }

    fn agent_json(id: &str, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": "Add a README",
            "status": status,
            "source": { "repository": "https://github.com/acme/widgets", "ref": "main" },
            "createdAt": "2026-01-05T10:00:00Z"
        })
    }

    #[tokio::test(start_paused = true)]
    async fn missing_conversation_is_empty() {
        let transport = ScriptedTransport::new();
        transport.push(Method::Get, "/v0/agents/bc-1/conversation", Step::status(409));
        let client = client(transport);
        assert_eq!(client.conversation("bc-1").await.unwrap(), Vec::<Message>::new());
    }

    #[tokio::test(start_paused = true)]
    async fn conversation_messages_are_returned_in_order() {
        let transport = ScriptedTransport::new();
        transport.push(
            Method::Get,
            "/v0/agents/bc-1/conversation",
            Step::json(
                200,
                &json!({
                    "id": "bc-1",
                    "messages": [
                        { "id": "u1", "type": "user_message", "text": "hi" },
                        { "id": "a1", "type": "assistant_message", "text": "hello" }
                    ]
                }),
            ),
        );
        let client = client(transport);
        let messages = client.conversation("bc-1").await.unwrap();
        assert_eq!(
            messages,
            vec![Message::user("u1", "hi"), Message::assistant("a1", "hello")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_agent_is_not_found() {
        let client = client(ScriptedTransport::new());
        let error = client.agent("bc-404").await.unwrap_err();
        assert!(matches!(error, ApiError::NotFound { ref path } if path == "/v0/agents/bc-404"));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_id_never_reaches_transport() {
        let client = client(ScriptedTransport::new());
        let error = client.agent("../me").await.unwrap_err();
        assert!(matches!(error, ApiError::Invalid(_)));
        assert!(client.transport().calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn launch_posts_request_body() {
        let transport = ScriptedTransport::new();
        transport.push(
            Method::Post,
            "/v0/agents",
            Step::json(201, &agent_json("bc-9", "CREATING")),
        );
        let client = client(transport);
        let agent = client
            .launch(&LaunchAgentRequest {
                prompt: Prompt::new("Add a README").unwrap(),
                source: LaunchSource {
                    repository: "https://github.com/acme/widgets".into(),
                    git_ref: None,
                },
                model: None,
                target: None,
            })
            .await
            .unwrap();
        assert_eq!(agent.id, "bc-9");

        let calls = client.transport().calls_to(Method::Post, "/v0/agents");
        assert_eq!(
            calls[0].body,
            Some(json!({
                "prompt": { "text": "Add a README" },
                "source": { "repository": "https://github.com/acme/widgets" }
            }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn follow_up_targets_agent() {
        let transport = ScriptedTransport::new();
        transport.push(
            Method::Post,
            "/v0/agents/bc-1/followup",
            Step::json(200, &json!({ "id": "bc-1" })),
        );
        let client = client(transport);
        let response = client
            .follow_up("bc-1", Prompt::new("also add tests").unwrap())
            .await
            .unwrap();
        assert_eq!(response.id, "bc-1");
        let calls = client.transport().calls_to(Method::Post, "/v0/agents/bc-1/followup");
        assert_eq!(calls[0].body, Some(json!({ "prompt": { "text": "also add tests" } })));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_share_the_queue_limit() {
        let transport = ScriptedTransport::new();
        transport.push(
            Method::Get,
            "/v0/agents/bc-1",
            Step::Delay(
                Duration::from_secs(1),
                RawResponse::json(200, &agent_json("bc-1", "RUNNING")),
            ),
        );
        let limits = QueueLimits {
            max_concurrent: 2,
            min_spacing: Duration::ZERO,
            burst_threshold: 100,
            ..QueueLimits::default()
        };
        let client = ApiClient::new(transport, RetryPolicy::default(), limits);

        let calls: Vec<_> = (0..6)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.agent("bc-1").await })
            })
            .collect();
        for call in calls {
            assert_eq!(call.await.unwrap().unwrap().id, "bc-1");
        }
        assert_eq!(client.transport().calls().len(), 6);
        assert_eq!(client.transport().peak_active(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn list_agents_passes_paging() {
        let transport = ScriptedTransport::new();
        transport.push(
            Method::Get,
            "/v0/agents",
            Step::json(
                200,
                &json!({ "agents": [agent_json("bc-1", "RUNNING")], "nextCursor": "c2" }),
            ),
        );
        let client = client(transport);
        let list = client.list_agents(Some(5), Some("c1")).await.unwrap();
        assert_eq!(list.agents.len(), 1);
        assert_eq!(list.next_cursor.as_deref(), Some("c2"));
    }
}
