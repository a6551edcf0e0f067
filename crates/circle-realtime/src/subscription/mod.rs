//! Caller intent that must outlive any single connection
//!
//! The desired room set and the outbound queue are both replayed onto every
//! new connection by the client.

mod queue;
mod registry;

pub use queue::OutboundQueue;
pub use registry::RoomRegistry;
