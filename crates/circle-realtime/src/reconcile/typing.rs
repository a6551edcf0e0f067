//! Typing indicators for one circle
//!
//! Remote "typing started" events stamp a user; "stopped" removes them. Users
//! whose last stamp is `ttl` old disappear, both from queries and from the
//! periodic sweep.

use super::circle_room;
use crate::connection::{RealtimeClient, SendOutcome};
use crate::dispatch::{HandlerGuard, HandlerResult};
use crate::protocol::{InboundMessage, OutboundMessage, TypingEvent};
use crate::time::TimerId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

#[derive(Default)]
struct TypingState {
    circle_id: Option<String>,
    /// Whether activation added the room to the desired set
    owns_room: bool,
    /// user id -> last "started" stamp
    entries: HashMap<String, u64>,
    sweep_timer: Option<TimerId>,
    /// Bumped on every scope change; sweeps from an older scope do nothing
    epoch: u64,
    guard: Option<HandlerGuard>,
    last_started_sent_ms: Option<u64>,
}

struct TypingInner {
    client: RealtimeClient,
    local_user_id: Option<String>,
    ttl: Duration,
    sweep_interval: Duration,
    throttle: Duration,
    state: Mutex<TypingState>,
}

/// Tracks who is typing in the active circle
#[derive(Clone)]
pub struct TypingTracker {
    inner: Arc<TypingInner>,
}

impl TypingTracker {
    #[must_use]
    pub fn new(client: RealtimeClient) -> Self {
        Self::build(client, None)
    }

    /// Ignore echoes of the local user's own typing
    #[must_use]
    pub fn with_local_user(client: RealtimeClient, user_id: impl Into<String>) -> Self {
        Self::build(client, Some(user_id.into()))
    }

    fn build(client: RealtimeClient, local_user_id: Option<String>) -> Self {
        let config = client.config();
        let (ttl, sweep_interval, throttle) = (
            config.typing_ttl(),
            config.typing_sweep_interval(),
            config.typing_throttle(),
        );
        Self {
            inner: Arc::new(TypingInner {
                client,
                local_user_id,
                ttl,
                sweep_interval,
                throttle,
                state: Mutex::new(TypingState::default()),
            }),
        }
    }

    /// Start tracking `circle_id`, leaving any previous circle first
    pub fn activate(&self, circle_id: &str) {
        if self.active_circle().as_deref() == Some(circle_id) {
            return;
        }
        self.deactivate();

        let room = circle_room(circle_id);
        let owns_room = !self.inner.client.is_subscribed(&room);
        if owns_room {
            self.inner.client.subscribe(&room);
        }

        let weak = Arc::downgrade(&self.inner);
        let guard = self.inner.client.register_handler(
            move |message: &InboundMessage| -> HandlerResult<()> {
                if let (InboundMessage::Typing(event), Some(inner)) = (message, weak.upgrade()) {
                    inner.apply(event);
                }
                Ok(())
            },
        );

        let mut st = self.inner.state.lock();
        st.circle_id = Some(circle_id.to_owned());
        st.owns_room = owns_room;
        st.guard = Some(guard);
        st.last_started_sent_ms = None;
        st.epoch += 1;
        self.inner.arm_sweep(&mut st);
        tracing::debug!(client_id = %self.inner.client.id(), circle_id = %circle_id, "Typing tracker active");
    }

    /// Stop tracking; cancels the sweep and forgets every entry
    pub fn deactivate(&self) {
        self.inner.deactivate();
    }

    #[must_use]
    pub fn active_circle(&self) -> Option<String> {
        self.inner.state.lock().circle_id.clone()
    }

    /// Users currently typing, sorted
    #[must_use]
    pub fn typing_users(&self) -> Vec<String> {
        let now = self.inner.client.clock().now_ms();
        let ttl = self.inner.ttl_ms();
        let st = self.inner.state.lock();
        let mut users: Vec<String> = st
            .entries
            .iter()
            .filter(|(_, seen)| now.saturating_sub(**seen) < ttl)
            .map(|(user, _)| user.clone())
            .collect();
        users.sort();
        users
    }

    #[must_use]
    pub fn is_typing(&self, user_id: &str) -> bool {
        let now = self.inner.client.clock().now_ms();
        let ttl = self.inner.ttl_ms();
        self.inner
            .state
            .lock()
            .entries
            .get(user_id)
            .is_some_and(|seen| now.saturating_sub(*seen) < ttl)
    }

    /// Tell the circle the local user started or stopped typing
    ///
    /// "Started" goes out at most once per throttle window; "stopped" is
    /// always sent. Returns `None` when nothing was sent.
    pub fn notify_typing(&self, is_typing: bool) -> Option<SendOutcome> {
        let now = self.inner.client.clock().now_ms();
        let throttle = crate::time::as_millis(self.inner.throttle);

        let circle_id = {
            let mut st = self.inner.state.lock();
            let circle_id = st.circle_id.clone()?;
            if is_typing {
                if let Some(last) = st.last_started_sent_ms {
                    if now.saturating_sub(last) < throttle {
                        return None;
                    }
                }
                st.last_started_sent_ms = Some(now);
            }
            circle_id
        };

        Some(
            self.inner
                .client
                .send(&OutboundMessage::typing(circle_id, is_typing)),
        )
    }
}

impl std::fmt::Debug for TypingTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.inner.state.lock();
        f.debug_struct("TypingTracker")
            .field("circle_id", &st.circle_id)
            .field("entries", &st.entries.len())
            .finish()
    }
}

impl TypingInner {
    fn ttl_ms(&self) -> u64 {
        crate::time::as_millis(self.ttl)
    }

    fn apply(&self, event: &TypingEvent) {
        if self.local_user_id.as_deref() == Some(event.user_id.as_str()) {
            return;
        }
        let now = self.client.clock().now_ms();

        let mut st = self.state.lock();
        if st.circle_id.as_deref() != Some(event.circle_id.as_str()) {
            return;
        }
        if event.is_typing {
            st.entries.insert(event.user_id.clone(), now);
        } else {
            st.entries.remove(&event.user_id);
        }
    }

    fn arm_sweep(self: &Arc<Self>, st: &mut TypingState) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let epoch = st.epoch;
        st.sweep_timer = Some(self.client.clock().schedule(
            self.sweep_interval,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.sweep(epoch);
                }
            }),
        ));
    }

    fn sweep(self: &Arc<Self>, epoch: u64) {
        let now = self.client.clock().now_ms();
        let ttl = self.ttl_ms();

        let mut st = self.state.lock();
        if st.epoch != epoch || st.circle_id.is_none() {
            return;
        }
        let before = st.entries.len();
        st.entries.retain(|_, seen| now.saturating_sub(*seen) < ttl);
        let expired = before - st.entries.len();
        if expired > 0 {
            tracing::trace!(expired, "Typing entries expired");
        }
        self.arm_sweep(&mut st);
    }

    fn deactivate(&self) {
        let (guard, room) = {
            let mut st = self.state.lock();
            if let Some(timer) = st.sweep_timer.take() {
                self.client.clock().cancel(timer);
            }
            st.entries.clear();
            st.epoch += 1;
            st.last_started_sent_ms = None;
            let circle_id = st.circle_id.take();
            let owned = std::mem::take(&mut st.owns_room);
            (st.guard.take(), circle_id.filter(|_| owned).map(|c| circle_room(&c)))
        };

        drop(guard);
        if let Some(room) = room {
            self.client.unsubscribe(&room);
        }
    }
}

impl Drop for TypingInner {
    fn drop(&mut self) {
        self.deactivate();
    }
}
