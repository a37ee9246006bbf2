//! Coordinate Backing Store Port
//!
//! The only shared state between nodes: one lease per actor and a pub/sub
//! channel per node. Implementations must make
//! [`CoordinateStore::acquire_or_renew_lease`] atomic; lease safety rests on
//! it.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc;
use types::{ActorId, NodeId, Timestamp};

use crate::error::CoordinateResult;

/// Result of a lease write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseOutcome {
    Granted {
        generation: u64,
        expires_at: Timestamp,
    },
    Denied {
        holder: NodeId,
        generation: u64,
        expires_at: Timestamp,
    },
}

impl LeaseOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, LeaseOutcome::Granted { .. })
    }
}

/// Current lease of one actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    pub actor_id: ActorId,
    pub holder: NodeId,
    pub generation: u64,
    pub expires_at: Timestamp,
}

impl LeaseRecord {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

#[async_trait]
pub trait CoordinateStore: Send + Sync + 'static {
    /// Acquire or renew the lease of `actor_id` for `node_id`
    ///
    /// With `generation == None` the lease is acquired when absent or
    /// expired, bumping the generation. With `Some(g)` it is renewed only if
    /// `node_id` still holds generation `g`. Either way a grant moves the
    /// expiry to `now + duration`.
    async fn acquire_or_renew_lease(
        &self,
        actor_id: &ActorId,
        node_id: &NodeId,
        generation: Option<u64>,
        duration: Duration,
    ) -> CoordinateResult<LeaseOutcome>;

    /// Expire the lease if `node_id` holds `generation`; returns whether it did
    async fn release_lease(
        &self,
        actor_id: &ActorId,
        node_id: &NodeId,
        generation: u64,
    ) -> CoordinateResult<bool>;

    async fn read_lease(&self, actor_id: &ActorId) -> CoordinateResult<Option<LeaseRecord>>;

    /// Deliver `payload` to the subscriber of `node_id`, if any
    async fn publish(&self, node_id: &NodeId, payload: Bytes) -> CoordinateResult<()>;

    /// Receive everything published to `node_id`; replaces earlier subscribers
    async fn subscribe(&self, node_id: &NodeId) -> CoordinateResult<mpsc::UnboundedReceiver<Bytes>>;
}
