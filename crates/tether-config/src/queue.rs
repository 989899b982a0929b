//! Priority request queue limits.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const fn default_max_concurrent() -> usize {
    2
}

const fn default_min_spacing_ms() -> u64 {
    250
}

const fn default_burst_threshold() -> usize {
    8
}

const fn default_burst_window_ms() -> u64 {
    2_000
}

const fn default_burst_cooldown_ms() -> u64 {
    1_000
}

const fn default_max_queue_age_ms() -> u64 {
    60_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Maximum number of requests executing at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Minimum gap between two dispatches, in milliseconds.
    #[serde(default = "default_min_spacing_ms")]
    pub min_spacing_ms: u64,

    /// Dispatch count within `burst_window_ms` above which the cooldown applies.
    #[serde(default = "default_burst_threshold")]
    pub burst_threshold: usize,

    /// Trailing window used to count recent dispatches.
    #[serde(default = "default_burst_window_ms")]
    pub burst_window_ms: u64,

    /// Extra delay inserted before the next dispatch during a burst.
    #[serde(default = "default_burst_cooldown_ms")]
    pub burst_cooldown_ms: u64,

    /// Items waiting longer than this are evicted without executing.
    #[serde(default = "default_max_queue_age_ms")]
    pub max_queue_age_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            min_spacing_ms: default_min_spacing_ms(),
            burst_threshold: default_burst_threshold(),
            burst_window_ms: default_burst_window_ms(),
            burst_cooldown_ms: default_burst_cooldown_ms(),
            max_queue_age_ms: default_max_queue_age_ms(),
        }
    }
}

impl QueueConfig {
    pub const fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }

    pub const fn burst_window(&self) -> Duration {
        Duration::from_millis(self.burst_window_ms)
    }

    pub const fn burst_cooldown(&self) -> Duration {
        Duration::from_millis(self.burst_cooldown_ms)
    }

    pub const fn max_queue_age(&self) -> Duration {
        Duration::from_millis(self.max_queue_age_ms)
    }
}
