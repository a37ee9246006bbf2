//! Protocol-level errors for client and node frame processing
//!
//! Every variant maps to a stable wire code via [`ProtocolError::code`] so
//! the runtime can report it on the offending connection without tearing
//! anything else down.

use thiserror::Error;

/// Frame decoding and validation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// Frame could not be parsed as a valid envelope
    #[error("Malformed message: {reason}")]
    MalformedMessage { reason: String },

    /// Frame exceeds the configured size limit
    #[error("Message too long: {size} bytes exceeds maximum {max}")]
    MessageTooLong { size: usize, max: usize },

    /// Requested encoding is not supported
    #[error("Invalid encoding '{encoding}': supported encodings are json, binary")]
    InvalidEncoding { encoding: String },

    /// Node envelope carries an unknown protocol version
    #[error("Unsupported protocol version {version}: supported version is {supported}")]
    UnsupportedVersion { version: u8, supported: u8 },

    /// Outgoing value could not be serialized
    #[error("Serialization failed ({encoding}): {reason}")]
    Serialization {
        encoding: &'static str,
        reason: String,
    },
}

impl ProtocolError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    /// Stable code reported to clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedMessage { .. } => "malformed_message",
            Self::MessageTooLong { .. } => "message_too_long",
            Self::InvalidEncoding { .. } => "invalid_encoding",
            Self::UnsupportedVersion { .. } => "unsupported_version",
            Self::Serialization { .. } => "internal_error",
        }
    }

    /// True when the error was caused by the peer's input
    pub fn is_peer_violation(&self) -> bool {
        !matches!(self, Self::Serialization { .. })
    }
}

impl From<bincode::Error> for ProtocolError {
    fn from(err: bincode::Error) -> Self {
        Self::malformed(format!("node envelope: {err}"))
    }
}
