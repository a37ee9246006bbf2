//! # Actor Runtime Wire Protocol
//!
//! ## Purpose
//!
//! The "rules" layer between raw transport bytes and the actor runtime:
//! - Client envelopes ([`ToServer`], [`ToClient`]) shared by every transport
//! - Pluggable [`Encoding`]s (JSON, MessagePack) with identical semantics
//! - Inbound size limits and malformed-frame classification
//! - Node relay envelopes ([`NodeEnvelope`]) for cross-node forwarding
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → libs/actors → libs/coordinate
//!     ↑           ↓            ↓               ↓
//! Identity   Envelopes     Dispatch      Node relay
//! Records    Encodings     Broadcast     Lease-aware routing
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Connection state or transport sockets (belongs in libs/actors)
//! - Lease handling or pub/sub (belongs in libs/coordinate)

pub mod constants;
pub mod encoding;
pub mod error;
pub mod protocol;

pub use constants::{DEFAULT_MAX_INCOMING_MESSAGE_SIZE, PROTOCOL_VERSION};
pub use encoding::{CachedFrame, Encoding, Frame};
pub use error::ProtocolError;
pub use protocol::client::{
    ActionRequest, ActionResponse, ErrorFrame, Event, Init, SubscriptionRequest, ToClient,
    ToClientBody, ToServer, ToServerBody,
};
pub use protocol::node::{
    generate_message_id, AckOutcome, NodeBody, NodeEnvelope, ReconnectCredential,
};
