//! Lifecycle and message-kind enums for Tether.
//!
//! Wire values follow the remote API: agent statuses are `SCREAMING_SNAKE_CASE`,
//! message kinds are `snake_case`. Unknown values fail deserialization so a
//! schema change surfaces as a malformed response instead of a silent default.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// AgentStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a remote agent.
///
/// ```text
/// creating → running → finished
///                    → stopped
///                    → error
///                    → expired
/// finished/stopped/error → running (follow-up reopens the agent)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Creating,
    Running,
    Finished,
    Stopped,
    Error,
    Expired,
}

impl AgentStatus {
    /// Whether no further progress happens from this status without a
    /// follow-up.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Stopped | Self::Error | Self::Expired
        )
    }

    /// Whether a follow-up prompt may reopen an agent in this status.
    ///
    /// Expired agents have lost their workspace and cannot be resumed.
    #[must_use]
    pub const fn accepts_follow_up(self) -> bool {
        !matches!(self, Self::Expired)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "CREATING",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Stopped => "STOPPED",
            Self::Error => "ERROR",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    UserMessage,
    AssistantMessage,
}

impl MessageKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserMessage => "user_message",
            Self::AssistantMessage => "assistant_message",
        }
    }

    #[must_use]
    pub const fn is_user(self) -> bool {
        matches!(self, Self::UserMessage)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!AgentStatus::Creating.is_terminal());
        assert!(!AgentStatus::Running.is_terminal());
        assert!(AgentStatus::Finished.is_terminal());
        assert!(AgentStatus::Stopped.is_terminal());
        assert!(AgentStatus::Error.is_terminal());
        assert!(AgentStatus::Expired.is_terminal());
    }

    #[test]
    fn expired_rejects_follow_up() {
        assert!(AgentStatus::Finished.accepts_follow_up());
        assert!(AgentStatus::Error.accepts_follow_up());
        assert!(!AgentStatus::Expired.accepts_follow_up());
    }

    #[test]
    fn status_wire_format_matches_display() {
        for status in [
            AgentStatus::Creating,
            AgentStatus::Running,
            AgentStatus::Finished,
            AgentStatus::Stopped,
            AgentStatus::Error,
            AgentStatus::Expired,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let parsed: Result<AgentStatus, _> = serde_json::from_str("\"PAUSED\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn message_kind_wire_format() {
        let kind: MessageKind = serde_json::from_str("\"assistant_message\"").unwrap();
        assert_eq!(kind, MessageKind::AssistantMessage);
        assert!(!kind.is_user());
        assert_eq!(MessageKind::UserMessage.to_string(), "user_message");
    }
}
