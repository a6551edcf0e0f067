//! Outbound frames

use serde::{Deserialize, Serialize};

/// Frames the client sends to the realtime service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// Join a room
    #[serde(rename = "subscribe")]
    Subscribe { room: String },

    /// Leave a room
    #[serde(rename = "unsubscribe")]
    Unsubscribe { room: String },

    /// Heartbeat acknowledgment
    #[serde(rename = "pong")]
    Pong,

    /// Local user's typing indicator
    #[serde(rename = "circle:typing", rename_all = "camelCase")]
    Typing { circle_id: String, is_typing: bool },
}

impl OutboundMessage {
    #[must_use]
    pub fn subscribe(room: impl Into<String>) -> Self {
        Self::Subscribe { room: room.into() }
    }

    #[must_use]
    pub fn unsubscribe(room: impl Into<String>) -> Self {
        Self::Unsubscribe { room: room.into() }
    }

    #[must_use]
    pub fn typing(circle_id: impl Into<String>, is_typing: bool) -> Self {
        Self::Typing {
            circle_id: circle_id.into(),
            is_typing,
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
