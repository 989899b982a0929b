use clap::{Args, Subcommand};

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Show the account behind the configured API key.
    Whoami,
    /// List repositories the account can launch agents against.
    Repos,
    /// List agents, newest first.
    List(ListArgs),
    /// Show one agent.
    Show(AgentIdArgs),
    /// Launch a new agent.
    Launch(LaunchArgs),
    /// Send a follow-up prompt to an agent.
    FollowUp(FollowUpArgs),
    /// Stop a running agent.
    Stop(AgentIdArgs),
    /// Delete an agent.
    Delete(AgentIdArgs),
    /// Follow an agent live until it settles. Ctrl-C stops watching.
    Watch(AgentIdArgs),
}

#[derive(Clone, Debug, Args)]
pub struct ListArgs {
    /// Max agents to return
    #[arg(short, long)]
    pub limit: Option<u32>,

    /// Continue from a previous page
    #[arg(long)]
    pub cursor: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct AgentIdArgs {
    /// Agent id
    pub id: String,
}

#[derive(Clone, Debug, Args)]
pub struct LaunchArgs {
    /// Repository URL
    #[arg(long)]
    pub repo: String,

    /// Task prompt
    #[arg(long)]
    pub prompt: String,

    /// Git ref to start from
    #[arg(long = "ref")]
    pub git_ref: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    /// Branch to push work to
    #[arg(long)]
    pub branch: Option<String>,

    /// Open a pull request when the run finishes
    #[arg(long)]
    pub auto_pr: bool,
}

#[derive(Clone, Debug, Args)]
pub struct FollowUpArgs {
    /// Agent id
    pub id: String,

    /// Follow-up prompt
    pub prompt: String,
}
