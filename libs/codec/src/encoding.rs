//! # Client Frame Encodings
//!
//! Two interchangeable encodings of the same envelopes:
//!
//! - [`Encoding::Json`]: text frames, for debuggability
//! - [`Encoding::Binary`]: MessagePack with named fields, for throughput
//!
//! Both go through the same serde derives, so any envelope decoded from one
//! encoding re-encodes to the same logical value in the other.
//!
//! [`CachedFrame`] serializes an outgoing message lazily, at most once per
//! encoding, so a broadcast to many connections only pays for each encoding
//! actually in use.

use bytes::Bytes;
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;
use crate::protocol::client::ToClient;

/// Wire encoding negotiated at handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Json,
    Binary,
}

/// One transport frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(bytes) => bytes,
        }
    }
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Binary => "binary",
        }
    }

    /// Serialize a value into a frame of this encoding
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Frame, ProtocolError> {
        match self {
            Encoding::Json => serde_json::to_string(value)
                .map(Frame::Text)
                .map_err(|e| ProtocolError::Serialization {
                    encoding: "json",
                    reason: e.to_string(),
                }),
            Encoding::Binary => rmp_serde::to_vec_named(value)
                .map(|bytes| Frame::Binary(Bytes::from(bytes)))
                .map_err(|e| ProtocolError::Serialization {
                    encoding: "binary",
                    reason: e.to_string(),
                }),
        }
    }

    /// Decode a frame, rejecting frames larger than `max_size` bytes
    pub fn decode<T: DeserializeOwned>(&self, frame: &Frame, max_size: usize) -> Result<T, ProtocolError> {
        let size = frame.len();
        if size > max_size {
            return Err(ProtocolError::MessageTooLong {
                size,
                max: max_size,
            });
        }
        match self {
            Encoding::Json => serde_json::from_slice(frame.as_bytes())
                .map_err(|e| ProtocolError::malformed(e.to_string())),
            Encoding::Binary => rmp_serde::from_slice(frame.as_bytes())
                .map_err(|e| ProtocolError::malformed(e.to_string())),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Encoding::Json),
            "binary" | "msgpack" => Ok(Encoding::Binary),
            other => Err(ProtocolError::InvalidEncoding {
                encoding: other.to_string(),
            }),
        }
    }
}

/// Outgoing message serialized on demand, once per encoding
#[derive(Debug)]
pub struct CachedFrame {
    message: ToClient,
    json: OnceCell<Frame>,
    binary: OnceCell<Frame>,
}

impl CachedFrame {
    pub fn new(message: ToClient) -> Self {
        Self {
            message,
            json: OnceCell::new(),
            binary: OnceCell::new(),
        }
    }

    pub fn message(&self) -> &ToClient {
        &self.message
    }

    /// Frame for `encoding`, serializing on first use
    pub fn frame(&self, encoding: Encoding) -> Result<Frame, ProtocolError> {
        let cell = match encoding {
            Encoding::Json => &self.json,
            Encoding::Binary => &self.binary,
        };
        cell.get_or_try_init(|| encoding.encode(&self.message))
            .cloned()
    }
}
