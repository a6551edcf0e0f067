//! Realtime wire protocol
//!
//! JSON text frames keyed by a `type` discriminator.

mod frame_types;
mod inbound;
mod outbound;

pub use frame_types::{
    CIRCLE_MESSAGE_NEW, CIRCLE_READ_HORIZON, CIRCLE_TYPING, PING, PONG, SUBSCRIBE, UNSUBSCRIBE,
};
pub use inbound::{
    CircleMessage, InboundMessage, NewMessageEvent, ProtocolError, ReadHorizonEvent, TypingEvent,
};
pub use outbound::OutboundMessage;
