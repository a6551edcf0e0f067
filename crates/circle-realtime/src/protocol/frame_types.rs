//! Frame type names
//!
//! Values of the `type` field for every frame the client understands.

/// Server heartbeat ping
pub const PING: &str = "ping";
/// Client heartbeat acknowledgment
pub const PONG: &str = "pong";
/// Join a room
pub const SUBSCRIBE: &str = "subscribe";
/// Leave a room
pub const UNSUBSCRIBE: &str = "unsubscribe";
/// A message was posted to a circle
pub const CIRCLE_MESSAGE_NEW: &str = "circle_message:new";
/// A member's read horizon advanced
pub const CIRCLE_READ_HORIZON: &str = "circle:read_horizon";
/// Typing indicator, both directions
pub const CIRCLE_TYPING: &str = "circle:typing";
