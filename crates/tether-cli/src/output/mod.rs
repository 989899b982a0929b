use serde::Serialize;
use tether_core::entities::{Account, Agent, Repository};
use tether_core::responses::AgentIdResponse;

use crate::cli::OutputFormat;

pub mod table;

/// Values that know how to lay themselves out as table rows.
pub trait Tabular {
    fn headers(&self) -> Vec<&'static str>;
    fn rows(&self) -> Vec<Vec<String>>;
}

/// Render a response to a string in the requested format.
pub fn render<T: Serialize + Tabular>(value: &T, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Table => Ok(table::render_table(
            &value.headers(),
            &value.rows(),
            table::TableOptions::detect(),
        )),
    }
}

/// Print a response in the requested format.
pub fn output<T: Serialize + Tabular>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    let rendered = render(value, format)?;
    println!("{rendered}");
    Ok(())
}

fn opt(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

impl Tabular for Agent {
    fn headers(&self) -> Vec<&'static str> {
        vec!["key", "value"]
    }

    fn rows(&self) -> Vec<Vec<String>> {
        let target = self.target.as_ref();
        [
            ("id", self.id.clone()),
            ("name", self.name.clone()),
            ("status", self.status.to_string()),
            ("repository", self.source.repository.clone()),
            ("ref", opt(self.source.git_ref.as_deref())),
            (
                "branch",
                opt(target.and_then(|t| t.branch_name.as_deref())),
            ),
            ("url", opt(target.and_then(|t| t.url.as_deref()))),
            ("pr", opt(target.and_then(|t| t.pr_url.as_deref()))),
            ("created", self.created_at.to_rfc3339()),
            ("summary", opt(self.summary_text())),
        ]
        .into_iter()
        .map(|(key, value)| vec![key.to_string(), value])
        .collect()
    }
}

impl Tabular for Vec<Agent> {
    fn headers(&self) -> Vec<&'static str> {
        vec!["id", "status", "name", "repository", "created"]
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.iter()
            .map(|agent| {
                vec![
                    agent.id.clone(),
                    agent.status.to_string(),
                    agent.name.clone(),
                    agent.source.repository.clone(),
                    agent.created_at.format("%Y-%m-%d %H:%M").to_string(),
                ]
            })
            .collect()
    }
}

impl Tabular for Vec<Repository> {
    fn headers(&self) -> Vec<&'static str> {
        vec!["owner", "name", "repository"]
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.iter()
            .map(|repo| vec![repo.owner.clone(), repo.name.clone(), repo.repository.clone()])
            .collect()
    }
}

impl Tabular for Account {
    fn headers(&self) -> Vec<&'static str> {
        vec!["key", "value"]
    }

    fn rows(&self) -> Vec<Vec<String>> {
        vec![
            vec!["api_key_name".to_string(), self.api_key_name.clone()],
            vec!["user_email".to_string(), opt(self.user_email.as_deref())],
            vec!["created".to_string(), self.created_at.to_rfc3339()],
        ]
    }
}

impl Tabular for AgentIdResponse {
    fn headers(&self) -> Vec<&'static str> {
        vec!["id"]
    }

    fn rows(&self) -> Vec<Vec<String>> {
        vec![vec![self.id.clone()]]
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tether_core::entities::AgentSource;
    use tether_core::enums::AgentStatus;

    use super::*;

    fn agent() -> Agent {
        Agent {
            id: "bc-1".into(),
            name: "Add a README".into(),
            status: AgentStatus::Running,
            source: AgentSource {
                repository: "https://github.com/acme/widgets".into(),
                git_ref: Some("main".into()),
            },
            target: None,
            summary: None,
            created_at: chrono::DateTime::parse_from_rfc3339("2026-01-05T10:00:00Z")
                .unwrap()
                .into(),
        }
    }

    #[test]
    fn json_render_is_valid_json() {
        let out = render(&agent(), OutputFormat::Json).expect("json render should work");
        let parsed: serde_json::Value = serde_json::from_str(&out).expect("json should parse");
        assert_eq!(parsed["id"], "bc-1");
        assert_eq!(parsed["status"], "RUNNING");
    }

    #[test]
    fn agent_list_rows_follow_headers() {
        let agents = vec![agent()];
        assert_eq!(
            agents.rows(),
            vec![vec![
                "bc-1".to_string(),
                "RUNNING".to_string(),
                "Add a README".to_string(),
                "https://github.com/acme/widgets".to_string(),
                "2026-01-05 10:00".to_string(),
            ]]
        );
    }

    #[test]
    fn missing_agent_fields_render_as_dash() {
        let rows = agent().rows();
        let summary = rows.iter().find(|row| row[0] == "summary").unwrap();
        assert_eq!(summary[1], "-");
    }
}
