//! Client error types
//!
//! Every fault the realtime client can observe is classified here. None of
//! them is surfaced from steady-state operations; they are logged and kept as
//! the client's most recent error for diagnostics.

use crate::config::ConfigError;
use std::fmt;

/// Broad classification of a client fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Open failure, unexpected close, network drop
    Transport,
    /// Inbound frame that could not be decoded
    MalformedFrame,
    /// A registered handler failed or panicked
    HandlerFault,
    /// Outbound frames were dropped by the bounded queue
    Backpressure,
    /// An operation was attempted without an authenticated session
    Unauthenticated,
    /// Invalid configuration
    Config,
}

impl ErrorKind {
    /// Stable code used in log fields
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Transport => "TRANSPORT",
            Self::MalformedFrame => "MALFORMED_FRAME",
            Self::HandlerFault => "HANDLER_FAULT",
            Self::Backpressure => "BACKPRESSURE",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Config => "CONFIG",
        }
    }

    /// Whether the client recovers from this kind on its own
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        !matches!(self, Self::Config)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Client-wide error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Handler fault: {0}")]
    HandlerFault(String),

    #[error("Outbound queue dropped {0} frame(s)")]
    Backpressure(usize),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::MalformedFrame(_) => ErrorKind::MalformedFrame,
            Self::HandlerFault(_) => ErrorKind::HandlerFault,
            Self::Backpressure(_) => ErrorKind::Backpressure,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Get error code for log fields
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        self.kind().code()
    }

    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }

    /// Create a transport error from anything displayable
    #[must_use]
    pub fn transport(err: impl fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
