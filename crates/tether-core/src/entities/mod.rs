//! Entity structs for all Tether domain objects.
//!
//! Each entity mirrors one JSON object of the remote agents API. All structs
//! derive `Serialize`, `Deserialize`, and `JsonSchema`, use `camelCase` field
//! names on the wire, and are treated as immutable values once received.

mod account;
mod agent;
mod message;
mod repository;

pub use account::Account;
pub use agent::{Agent, AgentSource, AgentTarget, validate_agent_id};
pub use message::Message;
pub use repository::Repository;
