//! Response envelopes returned by the remote agents API.
//!
//! Single-entity endpoints (`GET /v0/agents/{id}`, `POST /v0/agents`) return
//! the entity itself and need no envelope.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entities::{Agent, Message, Repository};

/// Response from `GET /v0/agents`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentList {
    pub agents: Vec<Agent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Response from `GET /v0/repositories`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RepositoryList {
    pub repositories: Vec<Repository>,
}

/// Response from `GET /v0/agents/{id}/conversation`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
}

/// Response from follow-up, stop and delete calls.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct AgentIdResponse {
    pub id: String,
}
