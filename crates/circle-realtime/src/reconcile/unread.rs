//! Unread counters

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unread message counts, total and per room
///
/// Seeded from the backend's snapshot and then moved only by deltas: one per
/// counted message, minus a room's whole contribution when it is read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCounters {
    total: u64,
    by_room: HashMap<String, u64>,
}

impl UnreadCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters from an authoritative snapshot
    ///
    /// The backend's total may include rooms it did not itemize, so it is
    /// kept as given rather than summed.
    #[must_use]
    pub fn from_snapshot(total: u64, by_room: HashMap<String, u64>) -> Self {
        Self { total, by_room }
    }

    /// Replace everything with a fresh snapshot
    pub fn refresh(&mut self, snapshot: UnreadCounters) {
        *self = snapshot;
    }

    /// Count one new message in `room`
    pub fn increment(&mut self, room: &str) {
        *self.by_room.entry(room.to_owned()).or_insert(0) += 1;
        self.total = self.total.saturating_add(1);
    }

    /// Zero `room` and take exactly its contribution off the total
    ///
    /// Returns the amount removed.
    pub fn clear_room(&mut self, room: &str) -> u64 {
        let removed = self.by_room.remove(room).unwrap_or(0);
        self.total = self.total.saturating_sub(removed);
        removed
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn for_room(&self, room: &str) -> u64 {
        self.by_room.get(room).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn by_room(&self) -> &HashMap<String, u64> {
        &self.by_room
    }
}
