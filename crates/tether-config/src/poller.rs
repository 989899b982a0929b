//! Task synchronization poller cadence and recovery configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const fn default_fast_interval_ms() -> u64 {
    2_000
}

const fn default_normal_interval_ms() -> u64 {
    5_000
}

const fn default_backoff_interval_ms() -> u64 {
    15_000
}

/// Covers the usual "agent is thinking" startup phase.
const fn default_fast_cycles() -> u32 {
    25
}

const fn default_jitter_ms() -> u64 {
    500
}

const fn default_conversation_every() -> u32 {
    2
}

fn default_settle_delays_ms() -> Vec<u64> {
    vec![2_000, 5_000, 10_000]
}

const fn default_follow_up_grace_ms() -> u64 {
    15_000
}

const fn default_watchdog_period_ms() -> u64 {
    10_000
}

const fn default_stall_timeout_ms() -> u64 {
    60_000
}

const fn default_rate_limit_window_ms() -> u64 {
    60_000
}

const fn default_error_threshold() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollerConfig {
    /// Interval used for the first `fast_cycles` cycles.
    #[serde(default = "default_fast_interval_ms")]
    pub fast_interval_ms: u64,

    /// Interval once the fast phase is over.
    #[serde(default = "default_normal_interval_ms")]
    pub normal_interval_ms: u64,

    /// Interval substituted while rate limiting is being observed.
    #[serde(default = "default_backoff_interval_ms")]
    pub backoff_interval_ms: u64,

    #[serde(default = "default_fast_cycles")]
    pub fast_cycles: u32,

    /// Upper bound of the uniform jitter added to every interval.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Fetch the conversation every N cycles when nothing forces it.
    #[serde(default = "default_conversation_every")]
    pub conversation_every: u32,

    /// Delays of the catch-up fetches after a terminal status is seen.
    #[serde(default = "default_settle_delays_ms")]
    pub settle_delays_ms: Vec<u64>,

    /// Window after a follow-up during which terminal statuses are ignored.
    #[serde(default = "default_follow_up_grace_ms")]
    pub follow_up_grace_ms: u64,

    #[serde(default = "default_watchdog_period_ms")]
    pub watchdog_period_ms: u64,

    /// Without a successful poll for this long, the watchdog restarts polling.
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,

    /// How long a 429 keeps the poller on the backoff interval.
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,

    /// Consecutive failed cycles before a degraded state is surfaced.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    /// Maximum total polling time for a task that never terminates.
    /// `0` leaves polling unbounded.
    #[serde(default)]
    pub max_duration_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            fast_interval_ms: default_fast_interval_ms(),
            normal_interval_ms: default_normal_interval_ms(),
            backoff_interval_ms: default_backoff_interval_ms(),
            fast_cycles: default_fast_cycles(),
            jitter_ms: default_jitter_ms(),
            conversation_every: default_conversation_every(),
            settle_delays_ms: default_settle_delays_ms(),
            follow_up_grace_ms: default_follow_up_grace_ms(),
            watchdog_period_ms: default_watchdog_period_ms(),
            stall_timeout_ms: default_stall_timeout_ms(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            error_threshold: default_error_threshold(),
            max_duration_ms: 0,
        }
    }
}

impl PollerConfig {
    pub const fn fast_interval(&self) -> Duration {
        Duration::from_millis(self.fast_interval_ms)
    }

    pub const fn normal_interval(&self) -> Duration {
        Duration::from_millis(self.normal_interval_ms)
    }

    pub const fn backoff_interval(&self) -> Duration {
        Duration::from_millis(self.backoff_interval_ms)
    }

    pub const fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }

    pub fn settle_delays(&self) -> Vec<Duration> {
        self.settle_delays_ms
            .iter()
            .copied()
            .map(Duration::from_millis)
            .collect()
    }

    pub const fn follow_up_grace(&self) -> Duration {
        Duration::from_millis(self.follow_up_grace_ms)
    }

    pub const fn watchdog_period(&self) -> Duration {
        Duration::from_millis(self.watchdog_period_ms)
    }

    pub const fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    pub const fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub const fn max_duration(&self) -> Option<Duration> {
        if self.max_duration_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.max_duration_ms))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let config = PollerConfig::default();
        assert_eq!(config.fast_interval(), Duration::from_secs(2));
        assert_eq!(config.normal_interval(), Duration::from_secs(5));
        assert_eq!(config.backoff_interval(), Duration::from_secs(15));
        assert_eq!(config.fast_cycles, 25);
        assert_eq!(config.conversation_every, 2);
        assert_eq!(config.settle_delays().len(), 3);
        assert_eq!(config.max_duration(), None);
    }

    #[test]
    fn max_duration_enabled_when_non_zero() {
        let config = PollerConfig {
            max_duration_ms: 3_600_000,
            ..Default::default()
        };
        assert_eq!(config.max_duration(), Some(Duration::from_secs(3600)));
    }
}
