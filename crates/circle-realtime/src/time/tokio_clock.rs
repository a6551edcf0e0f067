//! Tokio-backed clock

use super::{Clock, TimerId, TimerTask};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Pending timer bookkeeping
///
/// The slot is inserted before the task is spawned, so a fired task that
/// finds no slot knows it was cancelled.
#[derive(Default)]
struct TimerSlot {
    abort: Option<AbortHandle>,
}

/// Clock driven by the tokio timer wheel
pub struct TokioClock {
    origin: Instant,
    runtime: Handle,
    next_id: AtomicU64,
    timers: Arc<DashMap<TimerId, TimerSlot>>,
}

impl TokioClock {
    /// Create a clock on the current runtime
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    /// Create a clock on the current runtime, if there is one
    pub fn try_current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::with_handle)
    }

    #[must_use]
    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            origin: Instant::now(),
            runtime,
            next_id: AtomicU64::new(1),
            timers: Arc::new(DashMap::new()),
        }
    }

    /// Number of armed timers
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        super::as_millis(self.origin.elapsed())
    }

    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerId {
        let id = TimerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.timers.insert(id, TimerSlot::default());

        let timers = self.timers.clone();
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if timers.remove(&id).is_some() {
                task();
            }
        });

        if let Some(mut slot) = self.timers.get_mut(&id) {
            slot.abort = Some(join.abort_handle());
        }
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        match self.timers.remove(&id) {
            Some((_, slot)) => {
                if let Some(abort) = slot.abort {
                    abort.abort();
                }
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for TokioClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioClock")
            .field("now_ms", &self.now_ms())
            .field("pending_timers", &self.timers.len())
            .finish()
    }
}
