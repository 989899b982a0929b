use anyhow::Context;
use tether_client::ApiClient;

use crate::cli::GlobalFlags;
use crate::output::output;

pub async fn whoami(client: &ApiClient, flags: &GlobalFlags) -> anyhow::Result<()> {
    let account = client.me().await.context("failed to fetch account")?;
    output(&account, flags.format)
}

pub async fn repos(client: &ApiClient, flags: &GlobalFlags) -> anyhow::Result<()> {
    let list = client
        .repositories()
        .await
        .context("failed to list repositories")?;
    output(&list.repositories, flags.format)
}
