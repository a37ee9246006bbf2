//! Error types for identity parsing and identifier validation

use thiserror::Error;

/// Errors raised while parsing actor identities and typed identifiers
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IdentityError {
    /// Actor name is empty
    #[error("Actor name cannot be empty")]
    EmptyName,

    /// Serialized key ends in a dangling escape character
    #[error("Dangling escape at end of serialized key '{input}'")]
    DanglingEscape { input: String },

    /// Serialized name/key pair has no unescaped separator
    #[error("Missing name/key separator in '{input}'")]
    MissingSeparator { input: String },

    /// Identifier failed validation
    #[error("Invalid {kind} identifier '{value}': {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: String,
    },
}
