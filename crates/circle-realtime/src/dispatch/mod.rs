//! Inbound frame dispatch
//!
//! Parses frames, consumes heartbeats, and fans every other frame out to the
//! registered handlers with per-handler fault isolation.

mod dispatcher;
mod error;

pub use dispatcher::{Dispatcher, FrameOutcome, HandlerGuard, HandlerId, MessageHandler};
pub use error::{HandlerError, HandlerResult};
