//! # Protocol Constants
//!
//! Values that must stay stable across every node of a cluster: a node
//! rejects relay envelopes from a peer speaking a different version.

/// Node relay protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Default inbound client frame limit in bytes
pub const DEFAULT_MAX_INCOMING_MESSAGE_SIZE: usize = 65_536;
