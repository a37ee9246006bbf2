//! In-process [`CoordinateStore`]
//!
//! A lease table behind one mutex (every lease write is a compare-and-set
//! under that lock) and an unbounded channel per subscribed node. Nodes can
//! be made unreachable to simulate a network partition on the relay path.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use types::common::clock::add_duration;
use types::{now_ms, ActorId, NodeId};

use crate::error::CoordinateResult;
use crate::store::{CoordinateStore, LeaseOutcome, LeaseRecord};

#[derive(Debug, Default)]
pub struct MemoryCoordinateStore {
    leases: Mutex<HashMap<ActorId, LeaseRecord>>,
    subscribers: DashMap<NodeId, mpsc::UnboundedSender<Bytes>>,
    unreachable: DashSet<NodeId>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl MemoryCoordinateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every message published to `node_id` while `unreachable`
    pub fn set_unreachable(&self, node_id: &NodeId, unreachable: bool) {
        if unreachable {
            self.unreachable.insert(node_id.clone());
        } else {
            self.unreachable.remove(node_id);
        }
    }

    /// Messages delivered to a subscriber
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Messages with no reachable subscriber
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn lease(&self, actor_id: &ActorId) -> Option<LeaseRecord> {
        self.leases.lock().get(actor_id).cloned()
    }
}

#[async_trait]
impl CoordinateStore for MemoryCoordinateStore {
    async fn acquire_or_renew_lease(
        &self,
        actor_id: &ActorId,
        node_id: &NodeId,
        generation: Option<u64>,
        duration: Duration,
    ) -> CoordinateResult<LeaseOutcome> {
        let now = now_ms();
        let expires_at = add_duration(now, duration);
        let mut leases = self.leases.lock();

        let current = leases.get(actor_id).cloned();
        let granted = match (current, generation) {
            // Renewal: holder and generation must both still match
            (Some(lease), Some(expected)) if lease.holder == *node_id && lease.generation == expected => {
                lease.generation
            }
            (Some(lease), Some(_)) => {
                return Ok(LeaseOutcome::Denied {
                    holder: lease.holder,
                    generation: lease.generation,
                    expires_at: lease.expires_at,
                })
            }

            // Acquisition; a renewal of a purged lease starts over
            (None, _) => 1,
            (Some(lease), None) if lease.is_expired(now) => lease.generation + 1,
            (Some(lease), None) if lease.holder == *node_id => lease.generation,
            (Some(lease), None) => {
                return Ok(LeaseOutcome::Denied {
                    holder: lease.holder,
                    generation: lease.generation,
                    expires_at: lease.expires_at,
                })
            }
        };

        leases.insert(
            actor_id.clone(),
            LeaseRecord {
                actor_id: actor_id.clone(),
                holder: node_id.clone(),
                generation: granted,
                expires_at,
            },
        );
        trace!(actor_id = %actor_id, node_id = %node_id, generation = granted, "Lease granted");
        Ok(LeaseOutcome::Granted {
            generation: granted,
            expires_at,
        })
    }

    async fn release_lease(
        &self,
        actor_id: &ActorId,
        node_id: &NodeId,
        generation: u64,
    ) -> CoordinateResult<bool> {
        let mut leases = self.leases.lock();
        match leases.get_mut(actor_id) {
            Some(lease) if lease.holder == *node_id && lease.generation == generation => {
                // Keep the record so the next acquisition bumps the generation
                lease.expires_at = 0;
                debug!(actor_id = %actor_id, node_id = %node_id, generation, "Lease released");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn read_lease(&self, actor_id: &ActorId) -> CoordinateResult<Option<LeaseRecord>> {
        Ok(self.lease(actor_id))
    }

    async fn publish(&self, node_id: &NodeId, payload: Bytes) -> CoordinateResult<()> {
        if self.unreachable.contains(node_id) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(node_id = %node_id, "Dropping message to unreachable node");
            return Ok(());
        }
        let delivered = self
            .subscribers
            .get(node_id)
            .map(|tx| tx.send(payload).is_ok())
            .unwrap_or(false);
        if delivered {
            self.published.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn subscribe(&self, node_id: &NodeId) -> CoordinateResult<mpsc::UnboundedReceiver<Bytes>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(node_id.clone(), tx);
        debug!(node_id = %node_id, "Node subscribed");
        Ok(rx)
    }
}
