//! # tether-config
//!
//! Layered configuration loading for Tether using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`TETHER_*` prefix, `__` as separator)
//! 2. Project-level `.tether/config.toml`
//! 3. User-level `~/.config/tether/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `TETHER_API__KEY` -> `api.key`,
//! `TETHER_POLLER__NORMAL_INTERVAL_MS` -> `poller.normal_interval_ms`, etc.
//! The `__` (double underscore) separates nested config sections.
//!
//! # Usage
//!
//! ```no_run
//! use tether_config::TetherConfig;
//!
//! let config = TetherConfig::load_with_dotenv().expect("config");
//! if config.api.is_configured() {
//!     println!("API: {}", config.api.normalized_base_url());
//! }
//! ```

mod api;
mod error;
mod executor;
mod poller;
mod queue;

pub use api::ApiConfig;
pub use error::ConfigError;
pub use executor::ExecutorConfig;
pub use poller::PollerConfig;
pub use queue::QueueConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TetherConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub poller: PollerConfig,
}

impl TetherConfig {
    /// Load configuration from all sources (TOML files + environment variables)
    /// and validate it.
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] if you need
    /// `.env` file loading.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `.env` file support.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can inspect the figment directly or add providers on top.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(".tether/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("TETHER_").split("__"))
    }

    /// Reject values that would wedge the queue or the executor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue {
                field: "queue.max_concurrent".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.executor.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "executor.max_attempts".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.executor.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "executor.timeout_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.poller.conversation_every == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poller.conversation_every".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.poller.watchdog_period_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poller.watchdog_period_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Require the API section to carry a key.
    pub fn require_api(&self) -> Result<&ApiConfig, ConfigError> {
        if self.api.is_configured() {
            Ok(&self.api)
        } else {
            Err(ConfigError::NotConfigured {
                section: "api".into(),
            })
        }
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tether").join("config.toml"))
    }

    /// Load `.env` from the workspace root.
    ///
    /// Walks up from `CARGO_MANIFEST_DIR` (if available) or the current dir
    /// looking for a `.env` file. Silently does nothing if none is found.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            // crate -> crates/ -> workspace root
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }

        let _ = dotenvy::dotenv();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads() {
        let config = TetherConfig::default();
        assert!(!config.api.is_configured());
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.max_concurrent, 2);
    }

    #[test]
    fn require_api_fails_without_key() {
        let config = TetherConfig::default();
        assert!(matches!(
            config.require_api(),
            Err(ConfigError::NotConfigured { section }) if section == "api"
        ));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = TetherConfig::default();
        config.queue.max_concurrent = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "queue.max_concurrent"
        ));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let mut config = TetherConfig::default();
        config.executor.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
