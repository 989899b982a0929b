use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::AgentStatus;
use crate::errors::CoreError;

/// A remote unit of autonomous work.
///
/// Replaced wholesale on every successful status fetch; never patched in place.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub status: AgentStatus,
    pub source: AgentSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<AgentTarget>,
    /// Narrative of the latest run. Overwritten by the server on every run,
    /// so it only describes the most recent turn of a multi-turn thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The summary, if present and non-blank.
    #[must_use]
    pub fn summary_text(&self) -> Option<&str> {
        self.summary
            .as_deref()
            .map(str::trim)
            .filter(|summary| !summary.is_empty())
    }
}

/// Repository and ref an agent was launched against.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentSource {
    pub repository: String,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
}

/// Where the agent publishes its work.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default)]
    pub auto_create_pr: bool,
}

/// Check that an agent id can be embedded in a URL path segment.
///
/// # Errors
///
/// Returns [`CoreError::InvalidAgentId`] for empty ids or ids containing
/// anything other than ASCII alphanumerics, `-`, and `_`.
pub fn validate_agent_id(id: &str) -> Result<&str, CoreError> {
    let valid = !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(id)
    } else {
        Err(CoreError::InvalidAgentId(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "id": "bc_abc123",
        "name": "Add installation docs",
        "status": "FINISHED",
        "source": { "repository": "https://github.com/acme/widgets", "ref": "main" },
        "target": {
            "branchName": "agent/add-installation-docs",
            "url": "https://cursor.com/agents?id=bc_abc123",
            "prUrl": "https://github.com/acme/widgets/pull/42",
            "autoCreatePr": true
        },
        "summary": "Added a README section covering installation.",
        "createdAt": "2024-01-15T10:30:00Z"
    }"#;

    #[test]
    fn parse_agent_fixture() {
        let agent: Agent = serde_json::from_str(FIXTURE).unwrap();
        assert_eq!(agent.id, "bc_abc123");
        assert_eq!(agent.status, AgentStatus::Finished);
        assert!(agent.is_terminal());
        assert_eq!(agent.source.git_ref.as_deref(), Some("main"));
        let target = agent.target.unwrap();
        assert!(target.auto_create_pr);
        assert_eq!(
            target.pr_url.as_deref(),
            Some("https://github.com/acme/widgets/pull/42")
        );
    }

    #[test]
    fn minimal_agent_without_target_or_summary() {
        let agent: Agent = serde_json::from_str(
            r#"{
                "id": "bc_1",
                "name": "fresh",
                "status": "CREATING",
                "source": { "repository": "https://github.com/acme/widgets" },
                "createdAt": "2024-01-15T10:30:00Z"
            }"#,
        )
        .unwrap();
        assert!(agent.target.is_none());
        assert!(agent.summary_text().is_none());
        assert!(!agent.is_terminal());
    }

    #[test]
    fn blank_summary_is_treated_as_absent() {
        let mut agent: Agent = serde_json::from_str(FIXTURE).unwrap();
        agent.summary = Some("   ".into());
        assert!(agent.summary_text().is_none());
    }

    #[test]
    fn missing_status_is_rejected() {
        let parsed: Result<Agent, _> = serde_json::from_str(
            r#"{ "id": "bc_1", "name": "x", "source": { "repository": "r" }, "createdAt": "2024-01-15T10:30:00Z" }"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn agent_id_validation() {
        assert!(validate_agent_id("bc_abc-123").is_ok());
        assert!(validate_agent_id("").is_err());
        assert!(validate_agent_id("../me").is_err());
        assert!(validate_agent_id("a b").is_err());
    }
}
