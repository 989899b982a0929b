use anyhow::Context;
use tether_client::ApiClient;
use tether_config::TetherConfig;

pub fn load_config() -> anyhow::Result<TetherConfig> {
    TetherConfig::load_with_dotenv().context("failed to load tether configuration")
}

/// Build the API client, refusing to start without a key.
pub fn build_client(config: &TetherConfig) -> anyhow::Result<ApiClient> {
    config.require_api().context(
        "no API key configured. Set TETHER_API__KEY or add `key` under [api] in .tether/config.toml",
    )?;
    ApiClient::from_config(config).context("failed to build HTTP client")
}
