//! Transport abstraction
//!
//! The client drives a transport through [`Transport::open`] and hears back
//! through [`TransportEvents`]. Every event carries the generation of the
//! connection it belongs to, so late events from a superseded socket are
//! ignored.

use super::client::ClientInner;
use std::sync::Weak;

/// Transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to open connection: {0}")]
    Open(String),

    #[error("Connection is closed")]
    Closed,

    #[error("No async runtime available")]
    NoRuntime,

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<TransportError> for circle_common::ClientError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Factory for connections
///
/// `open` must return without delivering any event synchronously; the client
/// holds its state lock while calling it. Construction failures are returned
/// as `Err` and handled exactly like a failure after open.
pub trait Transport: Send + Sync + 'static {
    fn open(
        &self,
        url: &str,
        events: TransportEvents,
    ) -> Result<Box<dyn TransportConnection>, TransportError>;
}

/// Write half of an open (or opening) connection
///
/// Both methods must be non-blocking and must not call back into the client.
pub trait TransportConnection: Send + Sync {
    fn send(&self, frame: &str) -> Result<(), TransportError>;

    fn close(&self);
}

/// Sink through which a transport reports lifecycle events and frames
#[derive(Clone)]
pub struct TransportEvents {
    generation: u64,
    client: Weak<ClientInner>,
}

impl TransportEvents {
    pub(crate) fn new(generation: u64, client: Weak<ClientInner>) -> Self {
        Self { generation, client }
    }

    /// Generation of the connection these events belong to
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The connection is open
    pub fn opened(&self) {
        if let Some(client) = self.client.upgrade() {
            client.handle_open(self.generation);
        }
    }

    /// A text frame arrived
    pub fn frame(&self, text: &str) {
        if let Some(client) = self.client.upgrade() {
            client.handle_frame(self.generation, text);
        }
    }

    /// The connection closed
    pub fn closed(&self, reason: Option<String>) {
        if let Some(client) = self.client.upgrade() {
            client.handle_close(self.generation, reason);
        }
    }

    /// The connection failed, before or after opening
    pub fn failed(&self, error: TransportError) {
        if let Some(client) = self.client.upgrade() {
            client.handle_failure(self.generation, error);
        }
    }
}

impl std::fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportEvents")
            .field("generation", &self.generation)
            .finish()
    }
}
