//! Bounded outbound queue
//!
//! Holds serialized frames while the transport is down. When an append would
//! exceed capacity the oldest frames are dropped first, so the most recent
//! intent survives a long disconnection.

use std::collections::VecDeque;

/// FIFO of serialized frames with oldest-drop backpressure
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    frames: VecDeque<String>,
    capacity: usize,
    dropped_total: u64,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` frames (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            dropped_total: 0,
        }
    }

    /// Append a frame, returning how many old frames were dropped to make room
    pub fn push(&mut self, frame: String) -> usize {
        self.frames.push_back(frame);

        let excess = self.frames.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.frames.drain(..excess);
            self.dropped_total += excess as u64;
        }
        excess
    }

    /// Put frames back at the front, preserving their order
    ///
    /// Used when a flush is interrupted. Frames that no longer fit are
    /// dropped from the oldest end like any other overflow.
    pub fn requeue_front(&mut self, frames: Vec<String>) -> usize {
        for frame in frames.into_iter().rev() {
            self.frames.push_front(frame);
        }

        let excess = self.frames.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.frames.drain(..excess);
            self.dropped_total += excess as u64;
        }
        excess
    }

    /// Remove every frame, oldest first
    pub fn drain(&mut self) -> Vec<String> {
        self.frames.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames dropped over the queue's lifetime
    #[must_use]
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    /// Iterate frames oldest first
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.frames.iter().map(String::as_str)
    }
}
