//! Clock and timer abstraction
//!
//! Reconnect backoff, typing expiry and send throttling all read time and
//! arm timers through [`Clock`], so tests can drive them with
//! [`ManualClock`] instead of waiting on the wall clock.

mod manual;
mod tokio_clock;

pub use manual::ManualClock;
pub use tokio_clock::TokioClock;

use std::fmt;
use std::time::Duration;

/// Work run when a timer fires
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Identifier of an armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`
pub(crate) fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Monotonic time source that can also arm one-shot timers
///
/// Timer tasks must never run synchronously inside [`Clock::schedule`];
/// callers may hold locks while arming a timer.
pub trait Clock: Send + Sync + 'static {
    /// Milliseconds since an arbitrary, fixed origin
    fn now_ms(&self) -> u64;

    /// Run `task` once after `delay`
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerId;

    /// Cancel a pending timer
    ///
    /// Returns `false` if the timer already fired or was cancelled.
    fn cancel(&self, id: TimerId) -> bool;
}
