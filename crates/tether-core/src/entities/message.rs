use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::MessageKind;

/// One turn of an agent conversation.
///
/// The `id` is stable across fetches and is the only key used for
/// deduplication when merging batches.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub text: String,
}

impl Message {
    pub fn new(id: impl Into<String>, kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            text: text.into(),
        }
    }

    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, MessageKind::UserMessage, text)
    }

    pub fn assistant(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, MessageKind::AssistantMessage, text)
    }
}
