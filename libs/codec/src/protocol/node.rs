//! # Node Relay Envelopes
//!
//! Node-to-node traffic published over the coordinate store's pub/sub
//! channel. Followers forward client traffic to the leaseholder; the
//! leaseholder acknowledges every forward and streams outgoing client frames
//! back to the follower that owns the client link.
//!
//! ```text
//! follower                                   leader
//!    │ ── ForwardOpen {actor, conn, params} ──▶ │  connect on the live instance
//!    │ ◀──────── RelayAck {ack_for, Ok} ─────── │
//!    │ ◀──── ToFollowerFrame {conn, init} ───── │
//!    │ ── ForwardMessage {actor, conn, frame} ▶ │  process_message
//!    │ ◀──────── RelayAck {ack_for, Ok} ─────── │
//!    │ ◀─ ToFollowerFrame {conn, response} ──── │
//!    │ ── ForwardTouch {actor, conn} ─────────▶ │  touch (no ack)
//!    │ ── ForwardClose {actor, conn} ─────────▶ │  disconnect
//! ```
//!
//! Envelopes are bincode encoded. Client frames travel as opaque [`Frame`]s
//! in the connection's own encoding, so the follower never re-encodes them.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use types::{ActorId, ConnectionId, NodeId};

use crate::constants::PROTOCOL_VERSION;
use crate::encoding::{Encoding, Frame};
use crate::error::ProtocolError;

/// Global message ID counter for relay envelopes
static MESSAGE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate unique message ID
pub fn generate_message_id() -> u64 {
    MESSAGE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Envelope exchanged between nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEnvelope {
    pub version: u8,
    /// Unique per source node, echoed in [`NodeBody::RelayAck`]
    pub message_id: u64,
    pub source_node: NodeId,
    pub body: NodeBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeBody {
    /// Relay a client handshake to the leaseholder
    ForwardOpen {
        actor_id: ActorId,
        conn_id: ConnectionId,
        encoding: Encoding,
        /// Connection parameters as JSON text
        params: String,
        reconnect: Option<ReconnectCredential>,
    },
    /// Relay one client frame to the leaseholder
    ForwardMessage {
        actor_id: ActorId,
        conn_id: ConnectionId,
        frame: Frame,
    },
    /// Relay a client close to the leaseholder
    ForwardClose {
        actor_id: ActorId,
        conn_id: ConnectionId,
        reason: Option<String>,
    },
    /// Acknowledge a forward
    RelayAck { ack_for: u64, outcome: AckOutcome },
    /// Outgoing client frame routed back through the follower
    ToFollowerFrame { conn_id: ConnectionId, frame: Frame },
    /// Leaseholder closed the relayed connection
    ToFollowerClose {
        conn_id: ConnectionId,
        reason: Option<String>,
    },
    /// Client heartbeat for a relayed connection
    ForwardTouch { actor_id: ActorId, conn_id: ConnectionId },
}

/// Reconnection credential presented through a relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectCredential {
    pub connection_id: ConnectionId,
    pub token: String,
}

/// Result of handling a forward on the leaseholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AckOutcome {
    Ok,
    Rejected { code: String, message: String },
}

impl NodeBody {
    /// Whether the sender waits for a [`NodeBody::RelayAck`]
    pub fn expects_ack(&self) -> bool {
        matches!(
            self,
            NodeBody::ForwardOpen { .. }
                | NodeBody::ForwardMessage { .. }
                | NodeBody::ForwardClose { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NodeBody::ForwardOpen { .. } => "forward-open",
            NodeBody::ForwardMessage { .. } => "forward-message",
            NodeBody::ForwardClose { .. } => "forward-close",
            NodeBody::RelayAck { .. } => "relay-ack",
            NodeBody::ToFollowerFrame { .. } => "to-follower-frame",
            NodeBody::ToFollowerClose { .. } => "to-follower-close",
            NodeBody::ForwardTouch { .. } => "forward-touch",
        }
    }
}

impl NodeEnvelope {
    /// New envelope with a fresh message id
    pub fn new(source_node: NodeId, body: NodeBody) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message_id: generate_message_id(),
            source_node,
            body,
        }
    }

    pub fn ack(source_node: NodeId, ack_for: u64, outcome: AckOutcome) -> Self {
        Self::new(source_node, NodeBody::RelayAck { ack_for, outcome })
    }

    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        bincode::serialize(self)
            .map(Bytes::from)
            .map_err(|e| ProtocolError::Serialization {
                encoding: "bincode",
                reason: e.to_string(),
            })
    }

    /// Decode and reject envelopes from a different protocol version
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let envelope: NodeEnvelope = bincode::deserialize(bytes)?;
        if envelope.version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion {
                version: envelope.version,
                supported: PROTOCOL_VERSION,
            });
        }
        Ok(envelope)
    }
}
