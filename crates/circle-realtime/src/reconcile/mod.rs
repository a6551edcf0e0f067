//! Reconciliation of pushed events into cached view state
//!
//! Each reconciler registers one dispatcher handler for the lifetime of its
//! scope and releases it, along with any timers and bookkeeping, when the
//! scope ends. Applying the same event twice leaves the cache unchanged.

mod cache;
mod dedup;
mod messages;
mod read_horizon;
mod typing;
mod unread;

pub use cache::{MessageApplied, ViewCache};
pub use dedup::DedupSet;
pub use messages::MessageReconciler;
pub use read_horizon::ReadHorizonReconciler;
pub use typing::TypingTracker;
pub use unread::UnreadCounters;

/// Room carrying a circle's realtime traffic
#[must_use]
pub fn circle_room(circle_id: &str) -> String {
    format!("circle:{circle_id}")
}
