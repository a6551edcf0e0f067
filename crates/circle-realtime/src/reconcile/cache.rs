//! Locally cached view state
//!
//! The backend is authoritative; this cache is seeded from its HTTP
//! responses and then kept current by the reconcilers.

use super::unread::UnreadCounters;
use crate::protocol::CircleMessage;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// What [`ViewCache::apply_new_message`] did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageApplied {
    /// The circle already lists this id; nothing changed
    Duplicate,
    /// Appended without touching unread counters
    Listed,
    /// Appended and counted as unread
    Counted,
}

impl MessageApplied {
    #[must_use]
    pub const fn is_new(self) -> bool {
        !matches!(self, Self::Duplicate)
    }
}

#[derive(Debug, Default)]
struct CacheState {
    messages: HashMap<String, Vec<CircleMessage>>,
    read_horizons: HashMap<String, DateTime<Utc>>,
    unread: UnreadCounters,
    active_circle: Option<String>,
}

/// Shared view cache; clones see the same state
#[derive(Debug, Clone, Default)]
pub struct ViewCache {
    state: Arc<Mutex<CacheState>>,
}

impl ViewCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // === Seeding ===

    /// Replace a circle's message list with fetched history
    pub fn load_messages(&self, circle_id: &str, mut messages: Vec<CircleMessage>) {
        messages.sort_by_key(|m| m.created_at);
        self.state.lock().messages.insert(circle_id.to_owned(), messages);
    }

    /// Replace the unread counters with a backend snapshot
    pub fn refresh_unread(&self, snapshot: UnreadCounters) {
        self.state.lock().unread.refresh(snapshot);
    }

    /// Seed a circle's read horizon without touching counters
    pub fn seed_read_horizon(&self, circle_id: &str, at: DateTime<Utc>) {
        self.state
            .lock()
            .read_horizons
            .insert(circle_id.to_owned(), at);
    }

    /// The circle currently on screen; its new messages are not unread
    pub fn set_active_circle(&self, circle_id: Option<&str>) {
        self.state.lock().active_circle = circle_id.map(str::to_owned);
    }

    // === Mutations ===

    /// Append a message in `created_at` order
    ///
    /// An id the circle already lists is refused. A new message counts as
    /// unread when the circle is not active and the message is newer than
    /// the circle's read horizon.
    pub fn apply_new_message(&self, circle_id: &str, message: CircleMessage) -> MessageApplied {
        let mut state = self.state.lock();

        if state
            .messages
            .get(circle_id)
            .is_some_and(|list| list.iter().any(|m| m.id == message.id))
        {
            return MessageApplied::Duplicate;
        }

        let counts = state.active_circle.as_deref() != Some(circle_id)
            && state
                .read_horizons
                .get(circle_id)
                .map_or(true, |horizon| message.created_at > *horizon);

        let list = state.messages.entry(circle_id.to_owned()).or_default();
        let at = list.partition_point(|m| m.created_at <= message.created_at);
        list.insert(at, message);

        if counts {
            state.unread.increment(circle_id);
            MessageApplied::Counted
        } else {
            MessageApplied::Listed
        }
    }

    /// Move a circle's read horizon forward and zero its unread count
    ///
    /// Returns the unread amount removed, or `None` if `at` is not newer
    /// than the cached horizon.
    pub fn apply_read_horizon(&self, circle_id: &str, at: DateTime<Utc>) -> Option<u64> {
        let mut state = self.state.lock();
        if let Some(current) = state.read_horizons.get(circle_id) {
            if *current >= at {
                return None;
            }
        }
        state.read_horizons.insert(circle_id.to_owned(), at);
        Some(state.unread.clear_room(circle_id))
    }

    // === Queries ===

    #[must_use]
    pub fn messages(&self, circle_id: &str) -> Vec<CircleMessage> {
        self.state
            .lock()
            .messages
            .get(circle_id)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn message_count(&self, circle_id: &str) -> usize {
        self.state.lock().messages.get(circle_id).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn read_horizon(&self, circle_id: &str) -> Option<DateTime<Utc>> {
        self.state.lock().read_horizons.get(circle_id).copied()
    }

    #[must_use]
    pub fn unread(&self) -> UnreadCounters {
        self.state.lock().unread.clone()
    }

    #[must_use]
    pub fn unread_total(&self) -> u64 {
        self.state.lock().unread.total()
    }

    #[must_use]
    pub fn unread_for(&self, circle_id: &str) -> u64 {
        self.state.lock().unread.for_room(circle_id)
    }

    #[must_use]
    pub fn active_circle(&self) -> Option<String> {
        self.state.lock().active_circle.clone()
    }
}
