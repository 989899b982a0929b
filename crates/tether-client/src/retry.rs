//! Retry schedule, jitter source, and rate-limit observation.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tether_config::ExecutorConfig;
use tokio::time::Instant;

/// Fraction of the scaled delay that may be added as random jitter.
const JITTER_RATIO: f64 = 0.5;

/// Exponential backoff schedule for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Hard timeout for each attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

impl From<&ExecutorConfig> for RetryPolicy {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            timeout: config.timeout(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt number `attempt` (1-based).
    ///
    /// `base * 2^(attempt-1)` plus up to 50% jitter scaled by `jitter_unit`
    /// (clamped to `0.0..=1.0`), capped at `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32, jitter_unit: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let scaled = self
            .base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay);
        let jitter = scaled.mul_f64(JITTER_RATIO * jitter_unit.clamp(0.0, 1.0));
        scaled.saturating_add(jitter).min(self.max_delay)
    }

    #[must_use]
    pub const fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Uniform random value in `0.0..1.0` from the OS RNG.
///
/// Falls back to the midpoint if the RNG is unavailable; jitter is a
/// smoothing aid, not a security property.
#[must_use]
pub fn jitter_unit() -> f64 {
    let mut bytes = [0_u8; 8];
    if getrandom::fill(&mut bytes).is_err() {
        return 0.5;
    }
    // 53 random mantissa bits.
    (u64::from_le_bytes(bytes) >> 11) as f64 / (1_u64 << 53) as f64
}

/// Shared record of the most recent 429 seen by an executor.
///
/// The poller reads it to decide whether to switch to its backoff cadence.
#[derive(Debug, Clone, Default)]
pub struct RateLimitTracker {
    last: Arc<Mutex<Option<Instant>>>,
}

impl RateLimitTracker {
    pub fn record(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    /// Whether a 429 was observed within the trailing `window`.
    #[must_use]
    pub fn observed_within(&self, window: Duration) -> bool {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|at| at.elapsed() < window)
    }
}
