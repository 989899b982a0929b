//! Frozen summaries for multi-turn conversations.
//!
//! The remote `summary` field describes only the latest run and is overwritten
//! when a follow-up starts a new one. At follow-up time the current summary is
//! copied and anchored to the merged-log position right before the follow-up,
//! so earlier turns keep their narrative.

use chrono::{DateTime, Utc};
use tether_core::entities::Agent;

use crate::merge::MessageLog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuitySnapshot {
    pub summary: String,
    /// Merged-log length at capture; the follow-up's first message lands at
    /// or after this index.
    pub anchor: usize,
    /// Id of the last merged message at capture, if any.
    pub after_message_id: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// Per-task snapshot store. At most one snapshot per follow-up cycle; a cycle
/// stays open from a follow-up until the task next settles into a terminal
/// status.
///
/// Follow-ups are identified by their local id. A cycle is rolled back only
/// when every follow-up submitted in it was rejected.
#[derive(Debug, Clone, Default)]
pub struct ContinuityTracker {
    task_id: Option<String>,
    snapshots: Vec<ContinuitySnapshot>,
    cycle_open: bool,
    captured_this_cycle: bool,
    /// Follow-ups of the open cycle still waiting for the server's answer.
    unconfirmed: Vec<u64>,
    accepted_this_cycle: bool,
}

impl ContinuityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to `task_id`, dropping everything retained for another task.
    pub fn track(&mut self, task_id: &str) {
        if self.task_id.as_deref() != Some(task_id) {
            self.clear();
            self.task_id = Some(task_id.to_string());
        }
    }

    pub fn clear(&mut self) {
        self.task_id = None;
        self.snapshots.clear();
        self.close_cycle();
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn snapshots(&self) -> &[ContinuitySnapshot] {
        &self.snapshots
    }

    pub const fn cycle_open(&self) -> bool {
        self.cycle_open
    }

    /// Called when follow-up `local_id` is submitted. Captures the terminal
    /// summary of `agent` unless this cycle is already open.
    pub fn on_follow_up(
        &mut self,
        local_id: u64,
        agent: Option<&Agent>,
        log: &MessageLog,
    ) -> Option<&ContinuitySnapshot> {
        self.unconfirmed.push(local_id);
        if self.cycle_open {
            return None;
        }
        self.cycle_open = true;
        self.captured_this_cycle = false;
        self.accepted_this_cycle = false;

        let agent = agent.filter(|a| a.is_terminal())?;
        let summary = agent.summary_text()?;
        self.snapshots.push(ContinuitySnapshot {
            summary: summary.to_string(),
            anchor: log.len(),
            after_message_id: log.last_id().map(str::to_string),
            captured_at: Utc::now(),
        });
        self.captured_this_cycle = true;
        self.snapshots.last()
    }

    /// The server accepted follow-up `local_id`; its cycle is now permanent.
    pub fn accept_follow_up(&mut self, local_id: u64) {
        if self.confirm(local_id) {
            self.accepted_this_cycle = true;
        }
    }

    /// The server rejected follow-up `local_id`. Undoes [`Self::on_follow_up`]
    /// once no follow-up of the cycle is accepted or still in flight.
    pub fn cancel_follow_up(&mut self, local_id: u64) {
        if !self.confirm(local_id) || self.accepted_this_cycle || !self.unconfirmed.is_empty() {
            return;
        }
        if self.captured_this_cycle {
            self.snapshots.pop();
        }
        self.close_cycle();
    }

    /// Called when the task settles into a terminal status again.
    pub fn close_cycle(&mut self) {
        self.cycle_open = false;
        self.captured_this_cycle = false;
        self.accepted_this_cycle = false;
        self.unconfirmed.clear();
    }

    /// Drop `local_id` from the open cycle; false if it belongs to none.
    fn confirm(&mut self, local_id: u64) -> bool {
        let before = self.unconfirmed.len();
        self.unconfirmed.retain(|id| *id != local_id);
        self.unconfirmed.len() != before
    }
}
