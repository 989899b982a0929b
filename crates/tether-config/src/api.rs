//! Remote API endpoint and credential configuration.

use serde::{Deserialize, Serialize};

/// Default API base URL.
fn default_base_url() -> String {
    String::from("https://api.cursor.com")
}

/// Default `User-Agent` header.
fn default_user_agent() -> String {
    String::from("tether/0.1")
}

#[derive(Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Base URL the endpoint paths (`/v0/...`) are joined onto.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key sent as a bearer token. Usually provided through
    /// `TETHER_API__KEY` rather than a config file.
    #[serde(default)]
    pub key: String,

    /// `User-Agent` header value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            key: String::new(),
            user_agent: default_user_agent(),
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("key", &if self.key.is_empty() { "" } else { "<redacted>" })
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ApiConfig {
    /// Check if an API key is available.
    pub fn is_configured(&self) -> bool {
        !self.key.trim().is_empty()
    }

    /// Base URL without a trailing slash.
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }
}
