//! Reconnect policy and backoff calculation.
//!
//! Delays follow `min(base_delay * 2^attempt, max_delay)` with a zero-based
//! attempt index. No jitter is applied.

use std::time::Duration;

use querylink_settings::ReconnectSettings;

/// Default base delay.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Default maximum delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);
/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// When and how often the connection manager re-dials after a close.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Whether to reconnect at all after an unexpected close.
    pub enabled: bool,
    /// Delay before the first attempt.
    pub base_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl From<&ReconnectSettings> for ReconnectPolicy {
    fn from(settings: &ReconnectSettings) -> Self {
        Self {
            enabled: settings.enabled,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            max_attempts: settings.max_attempts,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before attempt number `attempt` (zero-based), ignoring limits.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff_delay(attempt, self.base_delay, self.max_delay)
    }

    /// Delay before the next attempt, or `None` once `attempt` has reached
    /// `max_attempts`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then(|| self.delay_for(attempt))
    }
}

/// Exponential backoff capped at `max_delay`.
#[must_use]
pub fn calculate_backoff_delay(attempt: u32, base_delay: Duration, max_delay: Duration) -> Duration {
    let factor = 1u32 << attempt.min(31);
    base_delay.saturating_mul(factor).min(max_delay)
}
