use tether_client::ApiClient;
use tether_config::TetherConfig;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::Commands;
use crate::commands;

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(
    command: Commands,
    client: &ApiClient,
    config: &TetherConfig,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match command {
        Commands::Whoami => commands::account::whoami(client, flags).await,
        Commands::Repos => commands::account::repos(client, flags).await,
        Commands::List(args) => commands::agents::list(&args, client, flags).await,
        Commands::Show(args) => commands::agents::show(&args.id, client, flags).await,
        Commands::Launch(args) => commands::agents::launch(args, client, flags).await,
        Commands::FollowUp(args) => commands::agents::follow_up(args, client, flags).await,
        Commands::Stop(args) => commands::agents::stop(&args.id, client, flags).await,
        Commands::Delete(args) => commands::agents::delete(&args.id, client, flags).await,
        Commands::Watch(args) => commands::watch::handle(&args.id, client, config, flags).await,
    }
}
