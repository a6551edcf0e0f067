//! Inbound frames
//!
//! Frames pushed by the realtime service. Decoding happens in two steps: the
//! `type` field is read first, then the known payloads are decoded into typed
//! events. Types this client does not know survive as [`InboundMessage::Other`]
//! so newer servers never break older clients.

use super::frame_types::{CIRCLE_MESSAGE_NEW, CIRCLE_READ_HORIZON, CIRCLE_TYPING, PING};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Decoding failures for inbound frames
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame has no string `type` field")]
    MissingType,

    #[error("Invalid `{kind}` payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl From<ProtocolError> for circle_common::ClientError {
    fn from(err: ProtocolError) -> Self {
        Self::MalformedFrame(err.to_string())
    }
}

/// A chat message as carried by `circle_message:new`
///
/// Only the identity and creation time are interpreted; every other field is
/// kept verbatim for the view layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleMessage {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CircleMessage {
    #[must_use]
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            extra: Map::new(),
        }
    }

    /// Attach an opaque field (author, body, attachments, ...)
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// `circle_message:new` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageEvent {
    pub circle_id: String,
    pub message: CircleMessage,
}

/// `circle:read_horizon` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadHorizonEvent {
    pub circle_id: String,
    pub last_read_at: DateTime<Utc>,
}

/// `circle:typing` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    pub circle_id: String,
    pub user_id: String,
    pub is_typing: bool,
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Heartbeat ping; answered by the dispatcher, never forwarded
    Ping,
    CircleMessageNew(NewMessageEvent),
    ReadHorizon(ReadHorizonEvent),
    Typing(TypingEvent),
    /// Any frame type this client does not interpret
    Other { kind: String, payload: Value },
}

impl InboundMessage {
    /// Deserialize from a JSON text frame
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Decode an already-parsed JSON value
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_owned();

        match kind.as_str() {
            PING => Ok(Self::Ping),
            CIRCLE_MESSAGE_NEW => decode(CIRCLE_MESSAGE_NEW, value).map(Self::CircleMessageNew),
            CIRCLE_READ_HORIZON => decode(CIRCLE_READ_HORIZON, value).map(Self::ReadHorizon),
            CIRCLE_TYPING => decode(CIRCLE_TYPING, value).map(Self::Typing),
            _ => Ok(Self::Other {
                kind,
                payload: value,
            }),
        }
    }

    /// The frame's `type` value
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Ping => PING,
            Self::CircleMessageNew(_) => CIRCLE_MESSAGE_NEW,
            Self::ReadHorizon(_) => CIRCLE_READ_HORIZON,
            Self::Typing(_) => CIRCLE_TYPING,
            Self::Other { kind, .. } => kind,
        }
    }

    /// The circle a frame is scoped to, if any
    #[must_use]
    pub fn circle_id(&self) -> Option<&str> {
        match self {
            Self::CircleMessageNew(e) => Some(&e.circle_id),
            Self::ReadHorizon(e) => Some(&e.circle_id),
            Self::Typing(e) => Some(&e.circle_id),
            Self::Ping | Self::Other { .. } => None,
        }
    }

    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Ping)
    }
}

fn decode<T: for<'de> Deserialize<'de>>(kind: &'static str, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.circle_id() {
            Some(circle_id) => write!(f, "InboundMessage(type={}, circle={circle_id})", self.kind()),
            None => write!(f, "InboundMessage(type={})", self.kind()),
        }
    }
}
