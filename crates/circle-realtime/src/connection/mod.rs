//! Connection lifecycle
//!
//! Owns the single transport connection, its reconnect schedule, and the
//! client-facing API built on top of it.

mod backoff;
mod client;
mod state;
mod transport;
mod websocket;

pub use backoff::Backoff;
pub use client::{ClientStats, RealtimeClient, RealtimeClientBuilder, SendOutcome};
pub use state::ConnectionState;
pub use transport::{Transport, TransportConnection, TransportError, TransportEvents};
pub use websocket::WebSocketTransport;
