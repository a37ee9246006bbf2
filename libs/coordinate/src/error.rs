//! # Coordinate Error Types
//!
//! Failures of the lease store and the node relay. Anything that reaches a
//! client is converted into an [`ActorError`] so it carries a stable wire
//! code.

use actor_runtime::ActorError;
use codec::ProtocolError;
use thiserror::Error;

/// Coordinate layer errors
#[derive(Error, Debug)]
pub enum CoordinateError {
    /// Backing store unavailable or rejected the operation
    #[error("Coordinate store error: {0}")]
    Store(String),

    /// Relay envelope could not be encoded or decoded
    #[error("Relay envelope error: {0}")]
    Codec(#[from] ProtocolError),

    /// Starting or stopping the local actor failed
    #[error(transparent)]
    Actor(#[from] ActorError),

    /// The node has been shut down
    #[error("Coordinate node is shut down")]
    Shutdown,
}

impl CoordinateError {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Whether a later attempt can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            CoordinateError::Store(_) => true,
            CoordinateError::Actor(err) => err.is_retryable(),
            CoordinateError::Codec(_) | CoordinateError::Shutdown => false,
        }
    }
}

impl From<CoordinateError> for ActorError {
    fn from(err: CoordinateError) -> Self {
        match err {
            CoordinateError::Actor(err) => err,
            CoordinateError::Codec(err) => ActorError::Protocol(err),
            CoordinateError::Store(message) => ActorError::internal(format!("coordinate store: {message}")),
            CoordinateError::Shutdown => ActorError::internal("coordinate node is shut down"),
        }
    }
}

/// Result type alias for coordinate operations
pub type CoordinateResult<T> = std::result::Result<T, CoordinateError>;
