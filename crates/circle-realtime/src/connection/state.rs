//! Connection state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state
///
/// Changed only by transport lifecycle events and explicit
/// `connect`/`disconnect` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No transport; a reconnect may be scheduled
    #[default]
    Disconnected,
    /// Transport is opening
    Connecting,
    /// Transport is open and subscriptions have been replayed
    Connected,
}

impl ConnectionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }

    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
