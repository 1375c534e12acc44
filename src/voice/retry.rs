//! Reconnect scheduling for the wake word stream

use std::time::{Duration, SystemTime};

/// Reconnect policy for the wake word stream
///
/// The default is a fixed 3 second delay with no attempt cap: the stream is
/// retried for as long as voice mode stays on. Exponential backoff and an
/// attempt cap are opt-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect (and every reconnect when fixed)
    pub base_delay: Duration,
    /// Maximum delay when backing off
    pub max_delay: Duration,
    /// Double the delay after each consecutive failure
    pub backoff: bool,
    /// Stop reconnecting after this many consecutive failures
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(3000),
            max_delay: Duration::from_secs(30),
            backoff: false,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Fixed delay, unbounded attempts
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            ..Self::default()
        }
    }

    /// Compute the delay before reconnect number `attempt` (0-based count of
    /// consecutive failures since the last successful connection).
    ///
    /// Returns `None` once the attempt cap is reached. With backoff the delay
    /// is `min(base_delay * 2^attempt + jitter, max_delay)`, jitter being
    /// 0-25% derived from `SystemTime`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return None;
        }

        if !self.backoff {
            return Some(self.base_delay);
        }

        let base = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);

        let jitter_nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();

        let jitter_fraction = f64::from(jitter_nanos % 250) / 1000.0;
        let jitter = base.mul_f64(jitter_fraction);

        Some((base + jitter).min(self.max_delay))
    }
}
