//! Reconnect backoff
//!
//! `delay(attempt) = min(base * 2^attempt, cap) + jitter`, with the jitter
//! drawn uniformly from `[0, jitter)`.

use circle_common::RealtimeConfig;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with a ceiling and additive jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    jitter: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration, cap: Duration, jitter: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
            jitter,
        }
    }

    #[must_use]
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(
            config.backoff_base(),
            config.backoff_cap(),
            config.backoff_jitter(),
        )
    }

    /// Delay before jitter; non-decreasing in `attempt` and never above the cap
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    /// Full delay including a random jitter
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let jitter_ms = crate::time::as_millis(self.jitter);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng.gen_range(0..jitter_ms))
        };
        self.base_delay(attempt).saturating_add(jitter)
    }

    #[must_use]
    pub fn cap(&self) -> Duration {
        self.cap
    }

    #[must_use]
    pub fn jitter(&self) -> Duration {
        self.jitter
    }
}
