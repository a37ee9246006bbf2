//! Actor Runtime Error Types
//!
//! One taxonomy for everything a client can observe: handler failures,
//! dispatch failures, connection failures and ownership failures. Every
//! variant has a stable wire code ([`ActorError::code`]) and knows how to
//! present itself to a client ([`ActorError::to_wire`]) without leaking
//! internal details unless exposure is configured.

use codec::ProtocolError;
use serde_json::Value;
use thiserror::Error;

/// Message sent to clients in place of an internal error
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal error. Read the server logs for more details.";

/// Default wire code of user errors
pub const USER_ERROR_CODE: &str = "user_error";

/// Main actor runtime error type
#[derive(Error, Debug)]
pub enum ActorError {
    /// Application-raised error, surfaced verbatim to the client
    #[error("{message}")]
    User {
        code: String,
        message: String,
        metadata: Option<Value>,
    },

    /// Unclassified failure, logged server-side and opaque to the client
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No handler registered under the requested name
    #[error("Action not found: {name}")]
    ActionNotFound { name: String },

    /// Handler did not finish within its timeout
    #[error("Action '{name}' timed out after {timeout_ms}ms")]
    ActionTimeout { name: String, timeout_ms: u64 },

    /// Authentication failed or a reconnection token did not match
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// This node lost the lease of the actor mid-operation
    #[error("Lease conflict: node no longer owns actor {actor_id}")]
    LeaseConflict { actor_id: String },

    /// The owning node did not acknowledge a relayed message in time
    #[error("Relay timeout: no ack from node {target} within {timeout_ms}ms")]
    RelayTimeout { target: String, timeout_ms: u64 },

    /// Connection id unknown to the actor
    #[error("Connection not found: {conn_id}")]
    ConnectionNotFound { conn_id: String },

    /// `on_connect` refused the connection
    #[error("Connection rejected: {reason}")]
    ConnectionRejected { reason: String },

    /// No actor exists for the query
    #[error("Actor not found: {name} {key:?}")]
    ActorNotFound { name: String, key: Vec<String> },

    /// `create` was called for an existing actor
    #[error("Actor already exists: {name} {key:?}")]
    ActorAlreadyExists { name: String, key: Vec<String> },

    /// Actor is not accepting work
    #[error("Actor {actor_id} is stopped")]
    ActorStopped { actor_id: String },

    /// Persistence port failure
    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Malformed or oversized frame
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Client-facing view of an error
#[derive(Debug, Clone, PartialEq)]
pub struct WireError {
    pub code: String,
    pub message: String,
    pub metadata: Option<Value>,
}

/// Convenience result type
pub type Result<T> = std::result::Result<T, ActorError>;

impl ActorError {
    /// User error with the default code
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            code: USER_ERROR_CODE.to_string(),
            message: message.into(),
            metadata: None,
        }
    }

    /// User error with a custom code and optional metadata
    pub fn user_with(code: impl Into<String>, message: impl Into<String>, metadata: Option<Value>) -> Self {
        Self::User {
            code: code.into(),
            message: message.into(),
            metadata,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with source
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            source: None,
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    pub fn action_timeout(name: impl Into<String>, timeout_ms: u64) -> Self {
        Self::ActionTimeout {
            name: name.into(),
            timeout_ms,
        }
    }

    pub fn relay_timeout(target: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RelayTimeout {
            target: target.into(),
            timeout_ms,
        }
    }

    /// Stable wire code
    pub fn code(&self) -> &str {
        match self {
            ActorError::User { code, .. } => code,
            ActorError::Internal { .. } => "internal_error",
            ActorError::ActionNotFound { .. } => "action_not_found",
            ActorError::ActionTimeout { .. } => "action_timed_out",
            ActorError::Unauthorized { .. } => "unauthorized",
            ActorError::LeaseConflict { .. } => "lease_conflict",
            ActorError::RelayTimeout { .. } => "relay_timeout",
            ActorError::ConnectionNotFound { .. } => "conn_not_found",
            ActorError::ConnectionRejected { .. } => "connection_rejected",
            ActorError::ActorNotFound { .. } => "actor_not_found",
            ActorError::ActorAlreadyExists { .. } => "actor_already_exists",
            ActorError::ActorStopped { .. } => "actor_stopped",
            ActorError::Persistence { .. } => "internal_error",
            ActorError::Protocol(err) => err.code(),
        }
    }

    /// Whether the caller may retry the same request
    pub fn is_retryable(&self) -> bool {
        match self {
            ActorError::ActionTimeout { .. } => true,
            ActorError::LeaseConflict { .. } => true,
            ActorError::RelayTimeout { .. } => true,
            ActorError::ActorStopped { .. } => true,
            ActorError::Persistence { .. } => true,
            ActorError::User { .. } => false,
            ActorError::Internal { .. } => false,
            ActorError::ActionNotFound { .. } => false,
            ActorError::Unauthorized { .. } => false,
            ActorError::ConnectionNotFound { .. } => false,
            ActorError::ConnectionRejected { .. } => false,
            ActorError::ActorNotFound { .. } => false,
            ActorError::ActorAlreadyExists { .. } => false,
            ActorError::Protocol(_) => false,
        }
    }

    /// Whether the error originates from server internals
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ActorError::Internal { .. } | ActorError::Persistence { .. }
        ) || matches!(self, ActorError::Protocol(err) if !err.is_peer_violation())
    }

    /// Get error category for monitoring
    pub fn category(&self) -> &'static str {
        match self {
            ActorError::User { .. } => "user",
            ActorError::Internal { .. } => "internal",
            ActorError::ActionNotFound { .. } | ActorError::ActionTimeout { .. } => "action",
            ActorError::Unauthorized { .. } => "auth",
            ActorError::LeaseConflict { .. } | ActorError::RelayTimeout { .. } => "coordinate",
            ActorError::ConnectionNotFound { .. } | ActorError::ConnectionRejected { .. } => {
                "connection"
            }
            ActorError::ActorNotFound { .. }
            | ActorError::ActorAlreadyExists { .. }
            | ActorError::ActorStopped { .. } => "lifecycle",
            ActorError::Persistence { .. } => "persistence",
            ActorError::Protocol(_) => "protocol",
        }
    }

    /// Client-facing representation
    ///
    /// Internal errors are replaced by [`INTERNAL_ERROR_MESSAGE`] unless
    /// `expose_internal` is set.
    pub fn to_wire(&self, expose_internal: bool) -> WireError {
        match self {
            ActorError::User {
                code,
                message,
                metadata,
            } => WireError {
                code: code.clone(),
                message: message.clone(),
                metadata: metadata.clone(),
            },
            err if err.is_internal() && !expose_internal => WireError {
                code: "internal_error".to_string(),
                message: INTERNAL_ERROR_MESSAGE.to_string(),
                metadata: None,
            },
            err => WireError {
                code: err.code().to_string(),
                message: err.to_string(),
                metadata: None,
            },
        }
    }
}

impl Clone for ActorError {
    fn clone(&self) -> Self {
        match self {
            ActorError::User {
                code,
                message,
                metadata,
            } => ActorError::User {
                code: code.clone(),
                message: message.clone(),
                metadata: metadata.clone(),
            },
            ActorError::Internal { message, .. } => ActorError::Internal {
                message: message.clone(),
                source: None, // Source errors are not cloneable, so we omit them
            },
            ActorError::ActionNotFound { name } => ActorError::ActionNotFound { name: name.clone() },
            ActorError::ActionTimeout { name, timeout_ms } => ActorError::ActionTimeout {
                name: name.clone(),
                timeout_ms: *timeout_ms,
            },
            ActorError::Unauthorized { reason } => ActorError::Unauthorized {
                reason: reason.clone(),
            },
            ActorError::LeaseConflict { actor_id } => ActorError::LeaseConflict {
                actor_id: actor_id.clone(),
            },
            ActorError::RelayTimeout { target, timeout_ms } => ActorError::RelayTimeout {
                target: target.clone(),
                timeout_ms: *timeout_ms,
            },
            ActorError::ConnectionNotFound { conn_id } => ActorError::ConnectionNotFound {
                conn_id: conn_id.clone(),
            },
            ActorError::ConnectionRejected { reason } => ActorError::ConnectionRejected {
                reason: reason.clone(),
            },
            ActorError::ActorNotFound { name, key } => ActorError::ActorNotFound {
                name: name.clone(),
                key: key.clone(),
            },
            ActorError::ActorAlreadyExists { name, key } => ActorError::ActorAlreadyExists {
                name: name.clone(),
                key: key.clone(),
            },
            ActorError::ActorStopped { actor_id } => ActorError::ActorStopped {
                actor_id: actor_id.clone(),
            },
            ActorError::Persistence { message, .. } => ActorError::Persistence {
                message: message.clone(),
                source: None,
            },
            ActorError::Protocol(err) => ActorError::Protocol(err.clone()),
        }
    }
}

impl From<serde_json::Error> for ActorError {
    fn from(err: serde_json::Error) -> Self {
        ActorError::internal_with_source("State serialization failed", err)
    }
}

impl From<anyhow::Error> for ActorError {
    fn from(err: anyhow::Error) -> Self {
        ActorError::Internal {
            message: format!("{err:#}"),
            source: None,
        }
    }
}

impl From<types::IdentityError> for ActorError {
    fn from(err: types::IdentityError) -> Self {
        ActorError::user_with("invalid_identity", err.to_string(), None)
    }
}
