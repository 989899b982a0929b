//! Sync session: one tokio task per tracked agent.
//!
//! The session task owns all mutable state (poll counters, merged log,
//! continuity snapshots) and reacts to five wake-ups: a caller command, a
//! finished follow-up submission, a finished fetch cycle, the next-cycle
//! timer, and the watchdog tick. Fetch cycles run as spawned sub-tasks so a
//! wedged request can be aborted without blocking commands.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tether_client::{ApiClient, ApiError, Transport, jitter_unit};
use tether_core::entities::{Agent, Message, validate_agent_id};
use tether_core::requests::Prompt;
use tether_core::responses::AgentIdResponse;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::continuity::{ContinuitySnapshot, ContinuityTracker};
use crate::error::SyncError;
use crate::merge::MessageLog;
use crate::poller::{Cadence, PollPhase, PollState};

// ── Public surface ─────────────────────────────────────────────────

/// Why a session stopped polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The task reached a terminal status and the catch-up fetches ran.
    Terminal,
    Requested,
    AuthFailed,
    /// The optional polling time limit elapsed.
    MaxDuration,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Terminal => "terminal",
            Self::Requested => "requested",
            Self::AuthFailed => "auth-failed",
            Self::MaxDuration => "max-duration",
        })
    }
}

/// Requests sent to a running session.
#[derive(Debug)]
pub enum SyncCommand {
    Stop,
    /// Submit a follow-up prompt, reopening a terminal task.
    FollowUp {
        text: String,
        reply: oneshot::Sender<Result<AgentIdResponse, SyncError>>,
    },
    /// Run a cycle now. This is the retry affordance after `Degraded`.
    Retry,
    /// Include the conversation in the next scheduled cycle.
    RefreshConversation,
}

/// Discrete updates emitted by a session, in the order they happened.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    PhaseChanged(PollPhase),
    /// A new status value was accepted. Carries the whole replacement value.
    StatusChanged(Agent),
    /// The merged log grew by `appended` messages.
    MessagesAppended {
        messages: Arc<Vec<Message>>,
        appended: usize,
    },
    FollowUpPending {
        local_id: u64,
        text: String,
    },
    /// The server echoed a pending follow-up back in the conversation.
    FollowUpEchoed {
        local_id: u64,
    },
    FollowUpFailed {
        local_id: u64,
        error: String,
    },
    SnapshotCaptured(ContinuitySnapshot),
    /// `failures` consecutive cycles failed. Emitted once until recovery.
    Degraded {
        failures: u32,
        error: String,
    },
    Recovered,
    WatchdogRestart {
        stalled_for: Duration,
    },
    AuthFailed {
        error: String,
    },
    Stopped {
        reason: StopReason,
    },
}

/// Final state handed back when a session ends.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub task_id: String,
    pub reason: StopReason,
    pub agent: Option<Agent>,
    pub messages: Arc<Vec<Message>>,
    pub snapshots: Vec<ContinuitySnapshot>,
    pub poll_count: u32,
}

/// Caller side of a spawned session.
pub struct SyncHandle {
    task_id: String,
    commands: mpsc::Sender<SyncCommand>,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    task: JoinHandle<SessionReport>,
}

impl SyncHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Next event, or `None` once the session has ended and the backlog is
    /// drained.
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        self.events.recv().await
    }

    pub async fn send(&self, command: SyncCommand) -> Result<(), SyncError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::SessionClosed)
    }

    pub async fn stop(&self) -> Result<(), SyncError> {
        self.send(SyncCommand::Stop).await
    }

    pub async fn retry(&self) -> Result<(), SyncError> {
        self.send(SyncCommand::Retry).await
    }

    pub async fn refresh_conversation(&self) -> Result<(), SyncError> {
        self.send(SyncCommand::RefreshConversation).await
    }

    /// Submit a follow-up and wait for the server to accept or reject it.
    pub async fn follow_up(&self, text: impl Into<String>) -> Result<AgentIdResponse, SyncError> {
        let (reply, response) = oneshot::channel();
        self.send(SyncCommand::FollowUp {
            text: text.into(),
            reply,
        })
        .await?;
        response.await.map_err(|_| SyncError::SessionClosed)?
    }

    /// Detach from the session and wait for its report. A session parked
    /// after a terminal status ends as soon as the handle is gone.
    pub async fn join(self) -> Result<SessionReport, SyncError> {
        let Self { commands, task, .. } = self;
        drop(commands);
        task.await.map_err(|e| SyncError::Join(e.to_string()))
    }

    /// Stop the session and wait for its report.
    pub async fn shutdown(self) -> Result<SessionReport, SyncError> {
        // A closed channel means the session already ended; join still
        // returns its report.
        let _ = self.stop().await;
        self.join().await
    }
}

// ── Session task ───────────────────────────────────────────────────

struct CycleOutcome {
    generation: u64,
    status: Result<Agent, ApiError>,
    conversation: Option<Result<Vec<Message>, ApiError>>,
}

struct FollowUpDone {
    local_id: u64,
    result: Result<AgentIdResponse, ApiError>,
    reply: oneshot::Sender<Result<AgentIdResponse, SyncError>>,
}

enum Wake {
    Command(Option<SyncCommand>),
    FollowUp(FollowUpDone),
    Cycle(Result<CycleOutcome, JoinError>),
    Timer,
    Watchdog,
}

pub struct SyncSession<T: Transport> {
    client: ApiClient<T>,
    cadence: Cadence,
    state: PollState,
    log: MessageLog,
    continuity: ContinuityTracker,
    agent: Option<Agent>,
    generation: u64,
    in_flight: Option<JoinHandle<CycleOutcome>>,
    next_wake: Option<Instant>,
    /// A cycle was asked for while one was in flight.
    cycle_requested: bool,
    stop_reason: Option<StopReason>,
    events: mpsc::UnboundedSender<SyncEvent>,
    follow_ups_tx: mpsc::UnboundedSender<FollowUpDone>,
    follow_ups_rx: mpsc::UnboundedReceiver<FollowUpDone>,
}

impl<T: Transport> SyncSession<T> {
    /// Start tracking `task_id` on a new tokio task.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Invalid`] if `task_id` is not a valid agent id.
    pub fn spawn(
        client: ApiClient<T>,
        cadence: Cadence,
        task_id: &str,
    ) -> Result<SyncHandle, SyncError> {
        let task_id = validate_agent_id(task_id)?.to_string();
        let (commands, command_rx) = mpsc::channel(16);
        let (events_tx, events) = mpsc::unbounded_channel();
        let (follow_ups_tx, follow_ups_rx) = mpsc::unbounded_channel();

        let session = Self {
            client,
            cadence,
            state: PollState::new(task_id.clone(), Instant::now()),
            log: MessageLog::new(),
            continuity: ContinuityTracker::new(),
            agent: None,
            generation: 0,
            in_flight: None,
            next_wake: None,
            cycle_requested: false,
            stop_reason: None,
            events: events_tx,
            follow_ups_tx,
            follow_ups_rx,
        };
        let task = tokio::spawn(session.run(command_rx));

        Ok(SyncHandle {
            task_id,
            commands,
            events,
            task,
        })
    }

    async fn run(mut self, mut commands: mpsc::Receiver<SyncCommand>) -> SessionReport {
        info!(task_id = %self.state.task_id, "sync session started");
        self.continuity.track(&self.state.task_id);
        self.set_phase(PollPhase::InitialFetch);

        let period = self.cadence.watchdog_period;
        let mut watchdog = tokio::time::interval_at(Instant::now() + period, period);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut flow = self.start_cycle();
        loop {
            if let ControlFlow::Break(reason) = flow {
                return self.finish(reason);
            }

            let wake = tokio::select! {
                command = commands.recv() => Wake::Command(command),
                Some(done) = self.follow_ups_rx.recv() => Wake::FollowUp(done),
                joined = join_cycle(&mut self.in_flight) => Wake::Cycle(joined),
                () = sleep_until(self.next_wake) => Wake::Timer,
                _ = watchdog.tick(), if self.state.phase.is_active() => Wake::Watchdog,
            };

            flow = match wake {
                Wake::Command(None) => {
                    ControlFlow::Break(self.stop_reason.unwrap_or(StopReason::Requested))
                }
                Wake::Command(Some(command)) => self.on_command(command),
                Wake::FollowUp(done) => self.on_follow_up_done(done),
                Wake::Cycle(joined) => {
                    self.in_flight = None;
                    self.on_cycle(joined)
                }
                Wake::Timer => {
                    self.next_wake = None;
                    self.start_cycle()
                }
                Wake::Watchdog => self.on_watchdog(),
            };
        }
    }

    // ── Cycles ─────────────────────────────────────────────────────

    fn start_cycle(&mut self) -> ControlFlow<StopReason> {
        if self.in_flight.is_some() {
            self.cycle_requested = true;
            return ControlFlow::Continue(());
        }
        let now = Instant::now();
        if self.state.phase.is_active() && self.cadence.exceeded_max_duration(&self.state, now) {
            warn!(task_id = %self.state.task_id, "maximum polling duration reached");
            return ControlFlow::Break(StopReason::MaxDuration);
        }

        self.next_wake = None;
        self.generation += 1;
        let generation = self.generation;
        let want_conversation = self.cadence.wants_conversation(&self.state);
        debug!(
            task_id = %self.state.task_id,
            generation,
            phase = %self.state.phase,
            want_conversation,
            "starting poll cycle"
        );

        let client = self.client.clone();
        let task_id = self.state.task_id.clone();
        self.in_flight = Some(tokio::spawn(run_cycle(
            client,
            task_id,
            generation,
            want_conversation,
        )));
        ControlFlow::Continue(())
    }

    fn on_cycle(&mut self, joined: Result<CycleOutcome, JoinError>) -> ControlFlow<StopReason> {
        let outcome = match joined {
            Ok(outcome) if outcome.generation == self.generation => outcome,
            Ok(outcome) => {
                debug!(
                    task_id = %self.state.task_id,
                    generation = outcome.generation,
                    "discarding superseded cycle result"
                );
                return ControlFlow::Continue(());
            }
            Err(error) if error.is_cancelled() => return ControlFlow::Continue(()),
            Err(error) => {
                warn!(task_id = %self.state.task_id, %error, "poll cycle panicked");
                self.record_failure(error.to_string());
                self.schedule_next(Instant::now());
                return ControlFlow::Continue(());
            }
        };

        let now = Instant::now();
        self.state.poll_count += 1;
        self.state.run_cycles += 1;

        let auth = [
            outcome.status.as_ref().err(),
            outcome.conversation.as_ref().and_then(|c| c.as_ref().err()),
        ]
        .into_iter()
        .flatten()
        .find(|e| e.is_auth());
        if let Some(error) = auth {
            warn!(task_id = %self.state.task_id, %error, "authorization failed; halting");
            self.emit(SyncEvent::AuthFailed {
                error: error.to_string(),
            });
            return ControlFlow::Break(StopReason::AuthFailed);
        }

        let mut failure = None;
        match outcome.status {
            Ok(agent) => {
                self.state.last_success = Some(now);
                self.accept_status(agent);
            }
            Err(error) => {
                warn!(task_id = %self.state.task_id, %error, "status fetch failed");
                failure = Some(error.to_string());
            }
        }
        match outcome.conversation {
            Some(Ok(batch)) => {
                self.state.force_conversation = false;
                self.merge(&batch);
            }
            Some(Err(error)) => {
                warn!(task_id = %self.state.task_id, %error, "conversation fetch failed");
                self.state.force_conversation = true;
                failure.get_or_insert_with(|| error.to_string());
            }
            None => {}
        }
        match failure {
            Some(error) => self.record_failure(error),
            None => self.record_success(),
        }

        self.state.rate_limited = self
            .client
            .rate_limits()
            .observed_within(self.cadence.rate_limit_window);
        self.advance_phase(now);
        self.schedule_next(now);
        ControlFlow::Continue(())
    }

    /// Replace the agent value, keeping a terminal status unless a follow-up
    /// reopened the task.
    fn accept_status(&mut self, agent: Agent) {
        let was_terminal = self.agent.as_ref().is_some_and(Agent::is_terminal);
        if was_terminal && !agent.is_terminal() && !self.state.awaiting_reopen {
            debug!(
                task_id = %self.state.task_id,
                status = %agent.status,
                "ignoring non-terminal status after terminal"
            );
            return;
        }
        if !agent.is_terminal() {
            self.state.awaiting_reopen = false;
        }
        if self.agent.as_ref() == Some(&agent) {
            return;
        }
        if let Some(previous) = &self.agent {
            if previous.status != agent.status {
                info!(
                    task_id = %self.state.task_id,
                    from = %previous.status,
                    to = %agent.status,
                    "status changed"
                );
            }
        }
        self.emit(SyncEvent::StatusChanged(agent.clone()));
        self.agent = Some(agent);
    }

    fn merge(&mut self, batch: &[Message]) {
        let pending_before: Vec<u64> = self.log.pending().iter().map(|p| p.local_id).collect();
        let appended = self.log.merge(batch);
        if appended == 0 {
            return;
        }
        debug!(task_id = %self.state.task_id, appended, total = self.log.len(), "merged messages");
        for local_id in pending_before {
            if !self.log.pending().iter().any(|p| p.local_id == local_id) {
                self.emit(SyncEvent::FollowUpEchoed { local_id });
            }
        }
        self.emit(SyncEvent::MessagesAppended {
            messages: Arc::clone(self.log.messages()),
            appended,
        });
    }

    fn advance_phase(&mut self, now: Instant) {
        let terminal = self.agent.as_ref().is_some_and(Agent::is_terminal);
        match self.state.phase {
            PollPhase::InitialFetch | PollPhase::Polling => {
                // Until the reopened task reports a non-terminal status, the
                // previous run's terminal status is stale.
                let holding = self.state.awaiting_reopen && self.state.in_grace(now);
                if terminal && !holding {
                    self.enter_settling();
                } else {
                    if terminal {
                        debug!(task_id = %self.state.task_id, "terminal status inside follow-up grace");
                    }
                    self.set_phase(PollPhase::Polling);
                }
            }
            PollPhase::TerminalSettling => {
                self.state.settle_step += 1;
                if self.state.settle_step >= self.cadence.settle_delays.len() {
                    self.settled();
                }
            }
            PollPhase::Idle | PollPhase::Stopped => {}
        }
    }

    fn enter_settling(&mut self) {
        self.state.settle_step = 0;
        self.state.awaiting_reopen = false;
        self.state.grace_until = None;
        self.continuity.close_cycle();
        self.set_phase(PollPhase::TerminalSettling);
        if self.cadence.settle_delays.is_empty() {
            self.settled();
        }
    }

    /// Park in `Stopped` after the catch-up fetches. The task stays alive so a
    /// follow-up can reopen it.
    fn settled(&mut self) {
        self.set_phase(PollPhase::Stopped);
        self.next_wake = None;
        self.stop_reason = Some(StopReason::Terminal);
        self.emit(SyncEvent::Stopped {
            reason: StopReason::Terminal,
        });
    }

    fn schedule_next(&mut self, now: Instant) {
        if self.in_flight.is_some() || self.state.phase == PollPhase::Stopped {
            return;
        }
        if std::mem::take(&mut self.cycle_requested) {
            self.next_wake = Some(now);
            return;
        }
        self.state.interval_class = self.cadence.interval_class(&self.state);
        self.next_wake = self
            .cadence
            .next_delay(&self.state, jitter_unit())
            .map(|delay| now + delay);
    }

    fn record_failure(&mut self, error: String) {
        self.state.consecutive_failures += 1;
        let failures = self.state.consecutive_failures;
        if !self.state.degraded && failures >= self.cadence.error_threshold {
            self.state.degraded = true;
            warn!(task_id = %self.state.task_id, failures, "sync degraded");
            self.emit(SyncEvent::Degraded { failures, error });
        }
    }

    fn record_success(&mut self) {
        self.state.consecutive_failures = 0;
        if self.state.degraded {
            self.state.degraded = false;
            info!(task_id = %self.state.task_id, "sync recovered");
            self.emit(SyncEvent::Recovered);
        }
    }

    fn on_watchdog(&mut self) -> ControlFlow<StopReason> {
        let now = Instant::now();
        if self.cadence.exceeded_max_duration(&self.state, now) {
            warn!(task_id = %self.state.task_id, "maximum polling duration reached");
            return ControlFlow::Break(StopReason::MaxDuration);
        }
        if self.agent.as_ref().is_some_and(Agent::is_terminal) {
            return ControlFlow::Continue(());
        }
        let Some(stalled_for) = self.cadence.stalled_for(&self.state, now) else {
            return ControlFlow::Continue(());
        };

        warn!(
            task_id = %self.state.task_id,
            ?stalled_for,
            "no successful poll within stall timeout; restarting cycle"
        );
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        self.cycle_requested = false;
        self.state.last_restart = Some(now);
        self.emit(SyncEvent::WatchdogRestart { stalled_for });
        self.start_cycle()
    }

    // ── Commands ───────────────────────────────────────────────────

    fn on_command(&mut self, command: SyncCommand) -> ControlFlow<StopReason> {
        match command {
            SyncCommand::Stop => {
                ControlFlow::Break(self.stop_reason.unwrap_or(StopReason::Requested))
            }
            SyncCommand::Retry => {
                if self.state.phase == PollPhase::Stopped {
                    debug!(task_id = %self.state.task_id, "retry ignored; session is stopped");
                    return ControlFlow::Continue(());
                }
                self.state.force_conversation = true;
                self.start_cycle()
            }
            SyncCommand::RefreshConversation => {
                self.state.force_conversation = true;
                ControlFlow::Continue(())
            }
            SyncCommand::FollowUp { text, reply } => {
                self.submit_follow_up(text, reply);
                ControlFlow::Continue(())
            }
        }
    }

    fn submit_follow_up(
        &mut self,
        text: String,
        reply: oneshot::Sender<Result<AgentIdResponse, SyncError>>,
    ) {
        let prompt = match Prompt::new(text) {
            Ok(prompt) => prompt,
            Err(error) => {
                let _ = reply.send(Err(error.into()));
                return;
            }
        };
        if let Some(agent) = &self.agent {
            if !agent.status.accepts_follow_up() {
                let _ = reply.send(Err(SyncError::FollowUpRejected {
                    id: agent.id.clone(),
                    status: agent.status,
                }));
                return;
            }
        }

        let local_id = self.log.add_pending(prompt.text.clone());
        let captured = self
            .continuity
            .on_follow_up(local_id, self.agent.as_ref(), &self.log)
            .cloned();
        if let Some(snapshot) = captured {
            info!(task_id = %self.state.task_id, anchor = snapshot.anchor, "captured summary snapshot");
            self.emit(SyncEvent::SnapshotCaptured(snapshot));
        }
        self.emit(SyncEvent::FollowUpPending {
            local_id,
            text: prompt.text.clone(),
        });

        let client = self.client.clone();
        let task_id = self.state.task_id.clone();
        let done = self.follow_ups_tx.clone();
        tokio::spawn(async move {
            let result = client.follow_up(&task_id, prompt).await;
            let _ = done.send(FollowUpDone {
                local_id,
                result,
                reply,
            });
        });
    }

    fn on_follow_up_done(&mut self, done: FollowUpDone) -> ControlFlow<StopReason> {
        let FollowUpDone {
            local_id,
            result,
            reply,
        } = done;

        match result {
            Ok(response) => {
                let now = Instant::now();
                info!(task_id = %self.state.task_id, "follow-up accepted; polling resumed");
                self.continuity.accept_follow_up(local_id);
                self.state.grace_until = Some(now + self.cadence.follow_up_grace);
                self.state.awaiting_reopen = true;
                self.state.force_conversation = true;
                self.state.run_cycles = 0;
                self.state.settle_step = 0;
                self.state.last_restart = Some(now);
                self.stop_reason = None;
                self.set_phase(PollPhase::Polling);
                let _ = reply.send(Ok(response));
                self.start_cycle()
            }
            Err(error) => {
                warn!(task_id = %self.state.task_id, %error, "follow-up rejected");
                self.log.discard_pending(local_id);
                self.continuity.cancel_follow_up(local_id);
                self.emit(SyncEvent::FollowUpFailed {
                    local_id,
                    error: error.to_string(),
                });
                if error.is_auth() {
                    self.emit(SyncEvent::AuthFailed {
                        error: error.to_string(),
                    });
                    let _ = reply.send(Err(error.into()));
                    return ControlFlow::Break(StopReason::AuthFailed);
                }
                let _ = reply.send(Err(error.into()));
                ControlFlow::Continue(())
            }
        }
    }

    // ── Plumbing ───────────────────────────────────────────────────

    fn set_phase(&mut self, phase: PollPhase) {
        if self.state.phase == phase {
            return;
        }
        info!(
            task_id = %self.state.task_id,
            from = %self.state.phase,
            to = %phase,
            "phase changed"
        );
        self.state.phase = phase;
        self.emit(SyncEvent::PhaseChanged(phase));
    }

    fn emit(&self, event: SyncEvent) {
        // Nobody listening is fine; the session keeps its own state.
        let _ = self.events.send(event);
    }

    fn finish(mut self, reason: StopReason) -> SessionReport {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        self.next_wake = None;
        self.set_phase(PollPhase::Stopped);
        if self.stop_reason.is_none() {
            self.emit(SyncEvent::Stopped { reason });
        }
        info!(
            task_id = %self.state.task_id,
            %reason,
            polls = self.state.poll_count,
            "sync session ended"
        );
        SessionReport {
            task_id: self.state.task_id.clone(),
            reason,
            agent: self.agent.take(),
            messages: Arc::clone(self.log.messages()),
            snapshots: self.continuity.snapshots().to_vec(),
            poll_count: self.state.poll_count,
        }
    }
}

async fn run_cycle<T: Transport>(
    client: ApiClient<T>,
    task_id: String,
    generation: u64,
    want_conversation: bool,
) -> CycleOutcome {
    let status = client.agent(&task_id).await;
    let fetch_conversation = match &status {
        Ok(agent) => want_conversation || agent.is_terminal(),
        Err(error) => want_conversation && !error.is_auth(),
    };
    let conversation = if fetch_conversation {
        Some(client.conversation(&task_id).await)
    } else {
        None
    };
    CycleOutcome {
        generation,
        status,
        conversation,
    }
}

async fn join_cycle(
    in_flight: &mut Option<JoinHandle<CycleOutcome>>,
) -> Result<CycleOutcome, JoinError> {
    match in_flight {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
