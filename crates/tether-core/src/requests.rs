//! Request bodies sent to the remote agents API.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Prompt text attached to a launch or follow-up.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
}

impl Prompt {
    /// Build a prompt, rejecting blank text.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyPrompt`] if `text` is empty after trimming.
    pub fn new(text: impl Into<String>) -> Result<Self, CoreError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(CoreError::EmptyPrompt);
        }
        Ok(Self { text })
    }
}

/// Body of `POST /v0/agents`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchAgentRequest {
    pub prompt: Prompt,
    pub source: LaunchSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<LaunchTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSource {
    pub repository: String,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchTarget {
    #[serde(default)]
    pub auto_create_pr: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
}

/// Body of `POST /v0/agents/{id}/followup`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct FollowUpRequest {
    pub prompt: Prompt,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn blank_prompt_is_rejected() {
        assert!(matches!(Prompt::new("  \n"), Err(CoreError::EmptyPrompt)));
        assert_eq!(Prompt::new("fix the build").unwrap().text, "fix the build");
    }

    #[test]
    fn launch_request_wire_shape() {
        let request = LaunchAgentRequest {
            prompt: Prompt::new("Add a README").unwrap(),
            source: LaunchSource {
                repository: "https://github.com/acme/widgets".into(),
                git_ref: Some("main".into()),
            },
            model: None,
            target: Some(LaunchTarget {
                auto_create_pr: true,
                branch_name: None,
            }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "prompt": { "text": "Add a README" },
                "source": { "repository": "https://github.com/acme/widgets", "ref": "main" },
                "target": { "autoCreatePr": true }
            })
        );
    }
}
