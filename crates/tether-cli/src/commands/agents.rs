use anyhow::Context;
use tether_client::ApiClient;
use tether_core::requests::{LaunchAgentRequest, LaunchSource, LaunchTarget, Prompt};

use crate::cli::root_commands::{FollowUpArgs, LaunchArgs, ListArgs};
use crate::cli::{GlobalFlags, OutputFormat};
use crate::output::output;

pub async fn list(args: &ListArgs, client: &ApiClient, flags: &GlobalFlags) -> anyhow::Result<()> {
    let page = client
        .list_agents(args.limit, args.cursor.as_deref())
        .await
        .context("failed to list agents")?;
    output(&page.agents, flags.format)?;
    if let Some(cursor) = page.next_cursor {
        if flags.format == OutputFormat::Table && !flags.quiet {
            eprintln!("more agents available: --cursor {cursor}");
        }
    }
    Ok(())
}

pub async fn show(id: &str, client: &ApiClient, flags: &GlobalFlags) -> anyhow::Result<()> {
    let agent = client
        .agent(id)
        .await
        .with_context(|| format!("failed to fetch agent {id}"))?;
    output(&agent, flags.format)
}

pub async fn launch(args: LaunchArgs, client: &ApiClient, flags: &GlobalFlags) -> anyhow::Result<()> {
    let request = launch_request(args)?;
    let agent = client
        .launch(&request)
        .await
        .context("failed to launch agent")?;
    output(&agent, flags.format)
}

pub async fn follow_up(
    args: FollowUpArgs,
    client: &ApiClient,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let prompt = Prompt::new(args.prompt)?;
    let response = client
        .follow_up(&args.id, prompt)
        .await
        .with_context(|| format!("failed to send follow-up to {}", args.id))?;
    output(&response, flags.format)
}

pub async fn stop(id: &str, client: &ApiClient, flags: &GlobalFlags) -> anyhow::Result<()> {
    let response = client
        .stop(id)
        .await
        .with_context(|| format!("failed to stop agent {id}"))?;
    output(&response, flags.format)
}

pub async fn delete(id: &str, client: &ApiClient, flags: &GlobalFlags) -> anyhow::Result<()> {
    let response = client
        .delete(id)
        .await
        .with_context(|| format!("failed to delete agent {id}"))?;
    output(&response, flags.format)
}

fn launch_request(args: LaunchArgs) -> anyhow::Result<LaunchAgentRequest> {
    let target = (args.auto_pr || args.branch.is_some()).then(|| LaunchTarget {
        auto_create_pr: args.auto_pr,
        branch_name: args.branch,
    });
    Ok(LaunchAgentRequest {
        prompt: Prompt::new(args.prompt)?,
        source: LaunchSource {
            repository: args.repo,
            git_ref: args.git_ref,
        },
        model: args.model,
        target,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn args() -> LaunchArgs {
        LaunchArgs {
            repo: "https://github.com/acme/widgets".into(),
            prompt: "Add a README".into(),
            git_ref: None,
            model: None,
            branch: None,
            auto_pr: false,
        }
    }

    #[test]
    fn plain_launch_has_no_target() {
        let request = launch_request(args()).unwrap();
        assert_eq!(request.target, None);
        assert_eq!(request.prompt.text, "Add a README");
    }

    #[test]
    fn branch_or_auto_pr_sets_target() {
        let request = launch_request(LaunchArgs {
            branch: Some("docs/readme".into()),
            ..args()
        })
        .unwrap();
        assert_eq!(
            request.target,
            Some(LaunchTarget {
                auto_create_pr: false,
                branch_name: Some("docs/readme".into()),
            })
        );
    }

    #[test]
    fn blank_prompt_is_rejected_before_sending() {
        let result = launch_request(LaunchArgs {
            prompt: "  ".into(),
            ..args()
        });
        assert!(result.is_err());
    }
}
