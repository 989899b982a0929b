use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A source repository connected to the account.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub owner: String,
    pub name: String,
    /// Full repository URL, used as `source.repository` when launching.
    pub repository: String,
}
