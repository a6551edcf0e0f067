//! Handler error types

use thiserror::Error;

/// Handler error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The handler could not apply the frame
    #[error("Handler failed: {0}")]
    Failed(String),

    /// The handler panicked; the panic was contained
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    #[must_use]
    pub fn failed(msg: impl std::fmt::Display) -> Self {
        Self::Failed(msg.to_string())
    }
}

impl From<HandlerError> for circle_common::ClientError {
    fn from(err: HandlerError) -> Self {
        Self::HandlerFault(err.to_string())
    }
}

/// Handler result type
pub type HandlerResult<T> = Result<T, HandlerError>;
