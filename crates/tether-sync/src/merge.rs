//! Append-only merge of fetched conversation batches.
//!
//! The remote conversation endpoint returns a full snapshot each time, and
//! two fetches may race. The merged log therefore only ever grows: existing
//! entries keep their position and content, unseen ids are appended in batch
//! order, and a batch with nothing new leaves the shared `Arc` untouched so
//! subscribers can skip work with `Arc::ptr_eq`.

use std::collections::HashSet;
use std::sync::Arc;

use tether_core::entities::Message;

/// Merge `batch` into `previous`.
///
/// Returns `previous` itself (same allocation) when `batch` has no unseen ids.
#[must_use]
pub fn merge_messages(previous: &Arc<Vec<Message>>, batch: &[Message]) -> Arc<Vec<Message>> {
    let mut seen: HashSet<&str> = previous.iter().map(|m| m.id.as_str()).collect();
    let fresh: Vec<&Message> = batch
        .iter()
        .filter(|m| seen.insert(m.id.as_str()))
        .collect();
    if fresh.is_empty() {
        return Arc::clone(previous);
    }
    let mut merged = Vec::with_capacity(previous.len() + fresh.len());
    merged.extend(previous.iter().cloned());
    merged.extend(fresh.into_iter().cloned());
    Arc::new(merged)
}

/// A follow-up shown locally before the server echoes it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub local_id: u64,
    pub text: String,
    /// Merged-log length when the follow-up was submitted. Only remote user
    /// messages at or after this index can resolve it.
    pub anchor: usize,
}

/// Merged conversation plus the optimistic follow-ups awaiting their echo.
///
/// Pending entries live beside the log, never inside it, so the log stays a
/// pure record of what the server returned.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Arc<Vec<Message>>,
    pending: Vec<PendingMessage>,
    next_local_id: u64,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn messages(&self) -> &Arc<Vec<Message>> {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_id(&self) -> Option<&str> {
        self.messages.last().map(|m| m.id.as_str())
    }

    pub fn pending(&self) -> &[PendingMessage] {
        &self.pending
    }

    /// Merge a fetched batch and resolve any pending follow-ups it echoes.
    ///
    /// Returns the number of appended messages.
    pub fn merge(&mut self, batch: &[Message]) -> usize {
        let merged = merge_messages(&self.messages, batch);
        let appended = merged.len() - self.messages.len();
        if appended > 0 {
            self.messages = merged;
            self.resolve_pending();
        }
        appended
    }

    /// Record an optimistic follow-up and return its local id.
    pub fn add_pending(&mut self, text: impl Into<String>) -> u64 {
        let local_id = self.next_local_id;
        self.next_local_id += 1;
        self.pending.push(PendingMessage {
            local_id,
            text: text.into(),
            anchor: self.messages.len(),
        });
        local_id
    }

    /// Drop a pending follow-up whose submission failed.
    pub fn discard_pending(&mut self, local_id: u64) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.local_id != local_id);
        self.pending.len() != before
    }

    fn resolve_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut claimed: HashSet<usize> = HashSet::new();
        let messages = Arc::clone(&self.messages);
        self.pending.retain(|pending| {
            let echo = messages
                .iter()
                .enumerate()
                .skip(pending.anchor)
                .filter(|(index, _)| !claimed.contains(index))
                .find(|(_, m)| m.kind.is_user() && m.text.trim() == pending.text.trim())
                .map(|(index, _)| index);
            match echo {
                Some(index) => {
                    claimed.insert(index);
                    false
                }
                None => true,
            }
        });
    }
}
