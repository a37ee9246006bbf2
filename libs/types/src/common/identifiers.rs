//! # Typed Identifiers
//!
//! String-backed wrappers that keep actor, connection and node identifiers
//! from being mixed up at call sites. All of them serialize transparently as
//! plain strings so they can travel inside wire envelopes and persisted
//! records unchanged.
//!
//! | Identifier         | Source                                   |
//! |--------------------|------------------------------------------|
//! | [`ActorId`]        | SHA3-256 of the serialized `{name, key}` |
//! | [`ConnectionId`]   | random UUID v4, issued at handshake      |
//! | [`NodeId`]         | random UUID v4, one per process          |
//! | [`ConnectionToken`]| 32 random bytes, hex encoded             |

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;
use uuid::Uuid;

use super::errors::IdentityError;

/// Number of digest bytes kept in an actor id
const ACTOR_ID_BYTES: usize = 16;

/// Number of random bytes in a connection token
const CONNECTION_TOKEN_BYTES: usize = 32;

/// Defines a transparent string identifier with the shared accessor set
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier, rejecting empty strings
            pub fn parse(value: impl Into<String>) -> Result<Self, IdentityError> {
                let value = value.into();
                if value.is_empty() {
                    return Err(IdentityError::InvalidIdentifier {
                        kind: $kind,
                        value,
                        reason: "identifier cannot be empty".to_string(),
                    });
                }
                Ok(Self(value))
            }

            /// Borrow the identifier as a string slice
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Extract the owned string
            #[inline]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// Deterministic identifier of one actor, derived from its name and key
    ActorId, "actor"
);

define_string_id!(
    /// Identifier of one client connection, stable across reconnects
    ConnectionId, "connection"
);

define_string_id!(
    /// Identifier of one runtime node in a cluster
    NodeId, "node"
);

impl ActorId {
    /// Derive the id from a serialized `name:key` string
    ///
    /// See [`crate::serialize_name_and_key`] for the escaping rules that make
    /// the input unambiguous.
    pub fn from_serialized(serialized: &str) -> Self {
        let digest = Sha3_256::digest(serialized.as_bytes());
        Self(hex::encode(&digest[..ACTOR_ID_BYTES]))
    }
}

impl ConnectionId {
    /// Generate a fresh random connection id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl NodeId {
    /// Generate a fresh random node id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Reconnection credential issued together with a [`ConnectionId`]
///
/// `Debug` output is redacted and equality is only available through the
/// constant-time [`ConnectionToken::verify`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionToken(String);

impl ConnectionToken {
    /// Generate a fresh random token
    pub fn generate() -> Self {
        let mut bytes = [0u8; CONNECTION_TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wrap a token presented by a client
    pub fn from_client(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the raw token for the handshake reply
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Compare against a presented token in constant time
    ///
    /// The running time depends only on the lengths of the two tokens, never
    /// on the position of the first differing byte.
    #[inline(never)]
    pub fn verify(&self, presented: &ConnectionToken) -> bool {
        let expected = self.0.as_bytes();
        let actual = presented.0.as_bytes();
        let mut diff = u8::from(expected.len() != actual.len());
        for (i, byte) in expected.iter().enumerate() {
            let other = actual.get(i).copied().unwrap_or(0);
            // Opaque to the optimizer so the loop is never cut short
            diff = std::hint::black_box(diff | (byte ^ other));
        }
        std::hint::black_box(diff) == 0
    }
}

impl fmt::Debug for ConnectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConnectionToken(..)")
    }
}
