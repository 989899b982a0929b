//! `tether watch`: follow one agent live through a sync session.

use anyhow::Context;
use serde::Serialize;
use serde_json::{Value, json};
use tether_client::ApiClient;
use tether_config::TetherConfig;
use tether_core::enums::MessageKind;
use tether_sync::{Cadence, SessionReport, SyncEvent, SyncSession};

use crate::cli::{GlobalFlags, OutputFormat};

pub async fn handle(
    id: &str,
    client: &ApiClient,
    config: &TetherConfig,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let mut handle = SyncSession::spawn(client.clone(), Cadence::from(&config.poller), id)
        .with_context(|| format!("cannot watch agent {id}"))?;
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = handle.next_event() => {
                let Some(event) = event else { break };
                print_event(&event, flags);
                if matches!(event, SyncEvent::Stopped { .. }) {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                signal.context("failed to listen for ctrl-c")?;
                interrupted = true;
                tracing::info!(task_id = id, "interrupted; stopping sync session");
                // A closed channel means the session already ended.
                let _ = handle.stop().await;
            }
        }
    }

    let report = handle.join().await.context("sync session failed")?;
    print_report(&report, flags)
}

fn print_event(event: &SyncEvent, flags: &GlobalFlags) {
    let (kind, detail) = describe(event);
    match flags.format {
        OutputFormat::Json => {
            let mut line = json!({ "event": kind });
            if let (Value::Object(line), Value::Object(detail)) = (&mut line, detail) {
                line.extend(detail);
            }
            println!("{line}");
        }
        OutputFormat::Table => {
            if flags.quiet && !matches!(event, SyncEvent::Stopped { .. }) {
                return;
            }
            let time = chrono::Local::now().format("%H:%M:%S");
            println!("{time}  {kind:<12}  {}", summarize(&detail));
        }
    }
}

/// Event name and structured detail.
fn describe(event: &SyncEvent) -> (&'static str, Value) {
    match event {
        SyncEvent::PhaseChanged(phase) => ("phase", json!({ "phase": phase.as_str() })),
        SyncEvent::StatusChanged(agent) => (
            "status",
            json!({ "status": agent.status.as_str(), "name": agent.name }),
        ),
        SyncEvent::MessagesAppended { messages, appended } => {
            let fresh: Vec<Value> = messages
                .iter()
                .skip(messages.len().saturating_sub(*appended))
                .map(|m| {
                    let role = match m.kind {
                        MessageKind::UserMessage => "user",
                        MessageKind::AssistantMessage => "assistant",
                    };
                    json!({ "id": m.id, "role": role, "text": m.text })
                })
                .collect();
            ("messages", json!({ "messages": fresh }))
        }
        SyncEvent::FollowUpPending { local_id, text } => (
            "follow-up",
            json!({ "local_id": local_id, "text": text, "state": "pending" }),
        ),
        SyncEvent::FollowUpEchoed { local_id } => (
            "follow-up",
            json!({ "local_id": local_id, "state": "delivered" }),
        ),
        SyncEvent::FollowUpFailed { local_id, error } => (
            "follow-up",
            json!({ "local_id": local_id, "state": "failed", "error": error }),
        ),
        SyncEvent::SnapshotCaptured(snapshot) => (
            "snapshot",
            json!({ "summary": snapshot.summary, "anchor": snapshot.anchor }),
        ),
        SyncEvent::Degraded { failures, error } => (
            "degraded",
            json!({ "failures": failures, "error": error }),
        ),
        SyncEvent::Recovered => ("recovered", json!({})),
        SyncEvent::WatchdogRestart { stalled_for } => (
            "watchdog",
            json!({ "stalled_ms": u64::try_from(stalled_for.as_millis()).unwrap_or(u64::MAX) }),
        ),
        SyncEvent::AuthFailed { error } => ("auth-failed", json!({ "error": error })),
        SyncEvent::Stopped { reason } => ("stopped", json!({ "reason": reason.to_string() })),
    }
}

/// One-line human summary of an event's detail.
fn summarize(detail: &Value) -> String {
    if let Some(messages) = detail.get("messages").and_then(Value::as_array) {
        return messages
            .iter()
            .map(|m| {
                format!(
                    "[{}] {}",
                    m["role"].as_str().unwrap_or("?"),
                    m["text"].as_str().unwrap_or_default().trim()
                )
            })
            .collect::<Vec<_>>()
            .join("\n                ");
    }
    detail
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(key, value)| match value {
                    Value::String(text) => format!("{key}={text}"),
                    other => format!("{key}={other}"),
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

#[derive(Serialize)]
struct WatchSummary<'a> {
    id: &'a str,
    reason: String,
    status: Option<&'static str>,
    summary: Option<&'a str>,
    messages: usize,
    snapshots: usize,
    polls: u32,
}

fn print_report(report: &SessionReport, flags: &GlobalFlags) -> anyhow::Result<()> {
    let summary = WatchSummary {
        id: &report.task_id,
        reason: report.reason.to_string(),
        status: report.agent.as_ref().map(|a| a.status.as_str()),
        summary: report.agent.as_ref().and_then(|a| a.summary_text()),
        messages: report.messages.len(),
        snapshots: report.snapshots.len(),
        polls: report.poll_count,
    };
    match flags.format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&summary)?),
        OutputFormat::Table => {
            if let Some(text) = summary.summary {
                println!("\n{text}");
            }
            if !flags.quiet {
                eprintln!(
                    "{}: {} ({} messages, {} polls, stopped: {})",
                    summary.id,
                    summary.status.unwrap_or("unknown"),
                    summary.messages,
                    summary.polls,
                    summary.reason
                );
            }
        }
    }
    Ok(())
}
