//! Deterministic virtual clock
//!
//! Time only moves when [`ManualClock::advance`] is called. Timers due within
//! the advanced window fire in deadline order, with `now_ms` set to each
//! timer's deadline while its task runs.

use super::{as_millis, Clock, TimerId, TimerTask};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

#[derive(Default)]
struct ManualState {
    now_ms: u64,
    next_id: u64,
    queue: BTreeMap<(u64, TimerId), TimerTask>,
    deadlines: HashMap<TimerId, u64>,
}

/// Clock whose time is advanced explicitly
#[derive(Default)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the clock at a given instant
    #[must_use]
    pub fn starting_at(now_ms: u64) -> Self {
        let clock = Self::default();
        clock.state.lock().now_ms = now_ms;
        clock
    }

    /// Move time forward, firing every timer that falls due
    ///
    /// Tasks run without the clock lock held, so they may arm or cancel
    /// further timers; a timer armed by a task fires in the same call if its
    /// deadline is still inside the window.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now_ms.saturating_add(as_millis(by));

        loop {
            let task = {
                let mut state = self.state.lock();
                let due = state
                    .queue
                    .first_key_value()
                    .map(|(key, _)| *key)
                    .filter(|(deadline, _)| *deadline <= target);

                match due {
                    Some(key) => {
                        let task = state.queue.remove(&key);
                        state.deadlines.remove(&key.1);
                        state.now_ms = state.now_ms.max(key.0);
                        task
                    }
                    None => {
                        state.now_ms = target;
                        None
                    }
                }
            };

            match task {
                Some(task) => task(),
                None => break,
            }
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Number of armed timers
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Delay until the earliest armed timer
    #[must_use]
    pub fn next_deadline_in(&self) -> Option<Duration> {
        let state = self.state.lock();
        state
            .queue
            .first_key_value()
            .map(|((deadline, _), _)| Duration::from_millis(deadline.saturating_sub(state.now_ms)))
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.state.lock().now_ms
    }

    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = TimerId::new(state.next_id);
        let deadline = state.now_ms.saturating_add(as_millis(delay));
        state.queue.insert((deadline, id), task);
        state.deadlines.insert(id, deadline);
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let mut state = self.state.lock();
        match state.deadlines.remove(&id) {
            Some(deadline) => state.queue.remove(&(deadline, id)).is_some(),
            None => false,
        }
    }
}

impl std::fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualClock")
            .field("now_ms", &state.now_ms)
            .field("pending_timers", &state.queue.len())
            .finish()
    }
}
