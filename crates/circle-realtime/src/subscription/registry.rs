//! Desired room set

use std::collections::HashSet;

/// Rooms the caller wants to receive, independent of transport state
#[derive(Debug, Default, Clone)]
pub struct RoomRegistry {
    rooms: HashSet<String>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record intent to receive `room`
    ///
    /// Returns `true` if the room was not already desired.
    pub fn add(&mut self, room: &str) -> bool {
        if self.rooms.contains(room) {
            return false;
        }
        self.rooms.insert(room.to_owned())
    }

    /// Drop intent for `room`
    ///
    /// Returns `true` if the room was desired.
    pub fn remove(&mut self, room: &str) -> bool {
        self.rooms.remove(room)
    }

    #[must_use]
    pub fn contains(&self, room: &str) -> bool {
        self.rooms.contains(room)
    }

    /// Rooms to re-join after a reconnect
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.rooms.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn clear(&mut self) {
        self.rooms.clear();
    }
}
