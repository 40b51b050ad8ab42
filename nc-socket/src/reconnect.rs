//! Reconnection policy for transient connection failures.

use std::time::Duration;

use nc_core::config::ReconnectConfig;

/// Bounded exponential backoff with jitter.
///
/// `max_attempts` bounds the total number of connection attempts in one
/// connect or reconnect cycle, the first one included. The first attempt is
/// always made. Authentication rejections are never retried regardless of
/// this policy.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Whether transient failures are retried at all.
    pub enabled: bool,
    /// Base delay between attempts.
    pub base_delay: Duration,
    /// Maximum delay cap for exponential backoff.
    pub max_delay: Duration,
    /// Total attempts per cycle, including the first.
    pub max_attempts: u32,
    /// Jitter factor (0.0 to 1.0) added to each delay.
    pub jitter_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            enabled: config.enabled,
            base_delay: Duration::from_millis(config.delay_ms),
            max_delay: Duration::from_millis(config.delay_max_ms.max(config.delay_ms)),
            max_attempts: config.attempts,
            jitter_factor: config.jitter_factor.clamp(0.0, 1.0),
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether another attempt may follow `attempts_made` failed attempts.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        self.enabled && attempts_made < self.max_attempts
    }

    /// Delay before retry number `retry` (0-based).
    ///
    /// Sequence with the defaults: 1s, 2s, 4s, then capped at 5s, each
    /// with +/- 30% jitter.
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();

        let exponential = (base * 2.0_f64.powi(retry.min(30) as i32)).min(max);

        let jitter_range = exponential * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            (rand::random::<f64>() * 2.0 - 1.0) * jitter_range
        } else {
            0.0
        };

        Duration::from_secs_f64((exponential + jitter).max(0.0))
    }
}
