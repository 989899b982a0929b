//! Poller state machine and cadence.
//!
//! ```text
//! Idle → InitialFetch → Polling → TerminalSettling → Stopped
//!                          ↑            │                │
//!                          └──── follow-up reopens ──────┘
//! ```
//!
//! Everything here is pure: the session feeds in cycle results and the clock,
//! and asks [`Cadence::next_delay`] for the one authoritative next wake-up.

use std::fmt;
use std::time::Duration;

use tether_config::PollerConfig;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollPhase {
    Idle,
    InitialFetch,
    Polling,
    TerminalSettling,
    Stopped,
}

impl PollPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::InitialFetch => "initial-fetch",
            Self::Polling => "polling",
            Self::TerminalSettling => "terminal-settling",
            Self::Stopped => "stopped",
        }
    }

    /// Phases in which the watchdog guards against a wedged loop.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::InitialFetch | Self::Polling)
    }
}

impl fmt::Display for PollPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base interval in effect for the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalClass {
    Fast,
    Normal,
    Backoff,
}

/// Per-task counters. Created when tracking starts, discarded with the
/// session.
#[derive(Debug, Clone)]
pub struct PollState {
    pub task_id: String,
    pub phase: PollPhase,
    /// Completed cycles since tracking started.
    pub poll_count: u32,
    /// Completed cycles since the current run started (reset by a follow-up).
    pub run_cycles: u32,
    pub interval_class: IntervalClass,
    pub rate_limited: bool,
    pub started_at: Instant,
    pub last_success: Option<Instant>,
    pub last_restart: Option<Instant>,
    pub consecutive_failures: u32,
    pub degraded: bool,
    /// Catch-up fetches completed since entering `TerminalSettling`.
    pub settle_step: usize,
    pub force_conversation: bool,
    /// Terminal statuses are ignored until this instant.
    pub grace_until: Option<Instant>,
    /// A follow-up was accepted and the task has not yet reported a
    /// non-terminal status.
    pub awaiting_reopen: bool,
}

impl PollState {
    pub fn new(task_id: impl Into<String>, now: Instant) -> Self {
        Self {
            task_id: task_id.into(),
            phase: PollPhase::Idle,
            poll_count: 0,
            run_cycles: 0,
            interval_class: IntervalClass::Fast,
            rate_limited: false,
            started_at: now,
            last_success: None,
            last_restart: None,
            consecutive_failures: 0,
            degraded: false,
            settle_step: 0,
            force_conversation: true,
            grace_until: None,
            awaiting_reopen: false,
        }
    }

    pub fn in_grace(&self, now: Instant) -> bool {
        self.grace_until.is_some_and(|until| now < until)
    }

    /// Reference point for stall detection.
    fn last_progress(&self) -> Instant {
        [self.last_success, self.last_restart]
            .into_iter()
            .flatten()
            .fold(self.started_at, Instant::max)
    }
}

/// Resolved poller timings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cadence {
    pub fast: Duration,
    pub normal: Duration,
    pub backoff: Duration,
    pub fast_cycles: u32,
    pub jitter: Duration,
    pub conversation_every: u32,
    pub settle_delays: Vec<Duration>,
    pub follow_up_grace: Duration,
    pub watchdog_period: Duration,
    pub stall_timeout: Duration,
    pub rate_limit_window: Duration,
    pub error_threshold: u32,
    pub max_duration: Option<Duration>,
}

impl Default for Cadence {
    fn default() -> Self {
        Self::from(&PollerConfig::default())
    }
}

impl From<&PollerConfig> for Cadence {
    fn from(config: &PollerConfig) -> Self {
        Self {
            fast: config.fast_interval(),
            normal: config.normal_interval(),
            backoff: config.backoff_interval(),
            fast_cycles: config.fast_cycles,
            jitter: config.jitter(),
            conversation_every: config.conversation_every.max(1),
            settle_delays: config.settle_delays(),
            follow_up_grace: config.follow_up_grace(),
            watchdog_period: config.watchdog_period(),
            stall_timeout: config.stall_timeout(),
            rate_limit_window: config.rate_limit_window(),
            error_threshold: config.error_threshold.max(1),
            max_duration: config.max_duration(),
        }
    }
}

impl Cadence {
    #[must_use]
    pub const fn interval_class(&self, state: &PollState) -> IntervalClass {
        if state.rate_limited {
            IntervalClass::Backoff
        } else if state.run_cycles < self.fast_cycles {
            IntervalClass::Fast
        } else {
            IntervalClass::Normal
        }
    }

    #[must_use]
    pub const fn base_interval(&self, class: IntervalClass) -> Duration {
        match class {
            IntervalClass::Fast => self.fast,
            IntervalClass::Normal => self.normal,
            IntervalClass::Backoff => self.backoff,
        }
    }

    /// Delay until the next cycle, or `None` when nothing more is scheduled.
    ///
    /// `jitter_unit` in `0.0..=1.0` scales the jitter added to base intervals.
    /// Settling delays are gaps between consecutive catch-up fetches and carry
    /// no jitter.
    #[must_use]
    pub fn next_delay(&self, state: &PollState, jitter_unit: f64) -> Option<Duration> {
        match state.phase {
            PollPhase::Idle | PollPhase::InitialFetch => Some(Duration::ZERO),
            PollPhase::Polling => {
                let base = self.base_interval(self.interval_class(state));
                Some(base + self.jitter.mul_f64(jitter_unit.clamp(0.0, 1.0)))
            }
            PollPhase::TerminalSettling => self.settle_delays.get(state.settle_step).copied(),
            PollPhase::Stopped => None,
        }
    }

    /// Whether the next cycle should fetch the conversation. A terminal
    /// status seen during the cycle forces a fetch regardless.
    #[must_use]
    pub const fn wants_conversation(&self, state: &PollState) -> bool {
        state.poll_count == 0
            || state.force_conversation
            || matches!(state.phase, PollPhase::TerminalSettling)
            || matches!(state.poll_count.checked_rem(self.conversation_every), Some(0))
    }

    /// How long the loop has gone without progress, if past `stall_timeout`.
    #[must_use]
    pub fn stalled_for(&self, state: &PollState, now: Instant) -> Option<Duration> {
        if !state.phase.is_active() {
            return None;
        }
        let idle = now.saturating_duration_since(state.last_progress());
        (idle >= self.stall_timeout).then_some(idle)
    }

    #[must_use]
    pub fn exceeded_max_duration(&self, state: &PollState, now: Instant) -> bool {
        self.max_duration
            .is_some_and(|max| now.saturating_duration_since(state.started_at) >= max)
    }
}
