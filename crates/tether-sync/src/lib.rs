//! # tether-sync
//!
//! Keeps a local view of one remote agent in step with the server.
//!
//! A [`SyncSession`] runs on its own tokio task and drives the poller state
//! machine in [`poller`]: status every cycle, the conversation on a slower
//! sub-cadence, catch-up fetches after a terminal status, and a watchdog that
//! restarts a wedged cycle. Fetched conversations flow through the
//! append-only [`merge`] engine, and [`continuity`] freezes the terminal
//! summary whenever a follow-up reopens the task.
//!
//! Callers hold a [`SyncHandle`]: commands go in, [`SyncEvent`]s come out, and
//! a [`SessionReport`] is returned when the session ends.

pub mod continuity;
pub mod error;
pub mod merge;
pub mod poller;
pub mod session;

pub use continuity::{ContinuitySnapshot, ContinuityTracker};
pub use error::SyncError;
pub use merge::{MessageLog, PendingMessage, merge_messages};
pub use poller::{Cadence, IntervalClass, PollPhase, PollState};
pub use session::{SessionReport, StopReason, SyncCommand, SyncEvent, SyncHandle, SyncSession};
