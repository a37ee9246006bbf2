//! Actor Peer
//!
//! One per actor this node has been asked about. The peer tracks who holds
//! the actor's lease and keeps checking:
//!
//! ```text
//!            acquire granted
//!  Unknown ─────────────────────▶ Leader ──┐ renew every
//!     │                             ▲  │   │ lease - grace
//!     │ denied                      │  ◀───┘
//!     ▼           acquire granted   │  │ renew denied / lease unverifiable
//!  Follower ────────────────────────┘  ▼
//!     ▲ check every interval + jitter  Follower / Unknown (instance fenced)
//!     └──┘
//! ```
//!
//! A leader runs the actor in the local [`Manager`]; losing the lease stops
//! it with [`StopReason::LeaseLost`] before anything else happens, so a
//! stale leader never writes again.
//!
//! A failed renewal is retried every check interval. If no grant arrives
//! before `expires_at - fence_margin` the leader fences itself, so the
//! instance is stopped before another node can acquire the expired lease.

use actor_runtime::{ActorError, ActorHandle, Manager, Result as ActorResult, StopReason};
use config::CoordinateOptions;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::{now_ms, ActorId, NodeId, Timestamp};

use crate::error::{CoordinateError, CoordinateResult};
use crate::metrics::CoordinateMetrics;
use crate::store::{CoordinateStore, LeaseOutcome};

/// What this node knows about an actor's lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerRole {
    Unknown,
    Leader { generation: u64, expires_at: Timestamp },
    Follower { leader: NodeId, generation: u64 },
}

impl PeerRole {
    pub fn leader<'a>(&'a self, local: &'a NodeId) -> Option<&'a NodeId> {
        match self {
            PeerRole::Unknown => None,
            PeerRole::Leader { .. } => Some(local),
            PeerRole::Follower { leader, .. } => Some(leader),
        }
    }

    pub fn generation(&self) -> Option<u64> {
        match self {
            PeerRole::Unknown => None,
            PeerRole::Leader { generation, .. } | PeerRole::Follower { generation, .. } => Some(*generation),
        }
    }
}

/// Emitted whenever the observed leaseholder or lease generation changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderChanged {
    pub actor_id: ActorId,
    pub leader: Option<NodeId>,
    pub generation: Option<u64>,
}

pub struct ActorPeer {
    actor_id: ActorId,
    node_id: NodeId,
    store: Arc<dyn CoordinateStore>,
    manager: Arc<Manager>,
    metrics: Arc<CoordinateMetrics>,
    events: mpsc::UnboundedSender<LeaderChanged>,
    role: RwLock<PeerRole>,
    /// Serializes lease transitions
    transition: tokio::sync::Mutex<()>,
    recheck: Notify,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    /// Last renewal attempt failed; retry on the check interval
    renewal_failing: AtomicBool,
}

impl ActorPeer {
    /// Run the first lease check and start the heartbeat
    pub async fn start(
        actor_id: ActorId,
        store: Arc<dyn CoordinateStore>,
        manager: Arc<Manager>,
        metrics: Arc<CoordinateMetrics>,
        events: mpsc::UnboundedSender<LeaderChanged>,
    ) -> CoordinateResult<Arc<Self>> {
        let peer = Arc::new(Self {
            actor_id,
            node_id: manager.node_id().clone(),
            store,
            manager,
            metrics,
            events,
            role: RwLock::new(PeerRole::Unknown),
            transition: tokio::sync::Mutex::new(()),
            recheck: Notify::new(),
            heartbeat: Mutex::new(None),
            renewal_failing: AtomicBool::new(false),
        });
        peer.check().await?;

        let handle = tokio::spawn(Self::run_heartbeat(Arc::downgrade(&peer)));
        *peer.heartbeat.lock() = Some(handle);
        Ok(peer)
    }

    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    pub fn role(&self) -> PeerRole {
        self.role.read().clone()
    }

    pub fn is_leader(&self) -> bool {
        matches!(*self.role.read(), PeerRole::Leader { .. })
    }

    pub fn leader(&self) -> Option<NodeId> {
        self.role.read().leader(&self.node_id).cloned()
    }

    /// Fetch or start the local instance while this node holds the lease
    ///
    /// Runs under the transition lock, so a lease loss either happens before
    /// (and the call fails with `LeaseConflict`) or after (and the instance
    /// returned here is the one it stops).
    pub async fn leader_instance(&self) -> ActorResult<Arc<dyn ActorHandle>> {
        let _transition = self.transition.lock().await;
        if !self.is_leader() {
            return Err(ActorError::LeaseConflict {
                actor_id: self.actor_id.to_string(),
            });
        }
        self.manager.instance(&self.actor_id).await
    }

    /// Something looked wrong with the current leader; check before the next tick
    pub fn suspect(&self) {
        debug!(actor_id = %self.actor_id, "Lease suspect, scheduling early check");
        self.recheck.notify_one();
    }

    fn options(&self) -> &CoordinateOptions {
        &self.manager.config().coordinate
    }

    /// Time left until an unrenewed lease must be fenced
    fn until_fence(&self, expires_at: Timestamp) -> Duration {
        let fence_at = expires_at.saturating_sub(self.options().fence_margin().as_millis() as i64);
        Duration::from_millis(fence_at.saturating_sub(now_ms()).max(0) as u64)
    }

    fn next_check_delay(&self) -> Duration {
        let options = self.options();
        if let PeerRole::Leader { expires_at, .. } = self.role() {
            let next = if self.renewal_failing.load(Ordering::Acquire) {
                options.check_lease_interval()
            } else {
                options.renew_after()
            };
            return next.min(self.until_fence(expires_at));
        }
        let jitter_ms = options.check_lease_jitter_ms;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        options.check_lease_interval() + Duration::from_millis(jitter)
    }

    async fn run_heartbeat(peer: std::sync::Weak<Self>) {
        loop {
            let Some(this) = peer.upgrade() else { break };
            let delay = this.next_check_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = this.recheck.notified() => {}
            }
            if let Err(e) = this.check().await {
                warn!(actor_id = %this.actor_id, error = %e, "Lease check failed");
            }
        }
    }

    /// Acquire, renew or observe the lease once
    pub async fn check(&self) -> CoordinateResult<()> {
        let _transition = self.transition.lock().await;
        let current = self.role();
        let generation = match &current {
            PeerRole::Leader { generation, .. } => Some(*generation),
            _ => None,
        };
        let duration = self.options().lease_duration();
        // A leader never waits on the store past its own lease
        let budget = match &current {
            PeerRole::Leader { expires_at, .. } => {
                let until_expiry = expires_at.saturating_sub(now_ms()).max(0) as u64;
                self.options()
                    .message_ack_timeout()
                    .min(Duration::from_millis(until_expiry))
            }
            _ => self.options().message_ack_timeout(),
        };

        let request = self
            .store
            .acquire_or_renew_lease(&self.actor_id, &self.node_id, generation, duration);
        let result = match tokio::time::timeout(budget, request).await {
            Ok(result) => result,
            Err(_) => Err(CoordinateError::store(format!(
                "lease request timed out after {}ms",
                budget.as_millis()
            ))),
        };
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.metrics.record_lease_error();
                if let PeerRole::Leader { expires_at, .. } = current {
                    if self.until_fence(expires_at).is_zero() {
                        warn!(actor_id = %self.actor_id, expires_at, "Lease not renewed before expiry");
                        self.renewal_failing.store(false, Ordering::Release);
                        self.lose_leadership(PeerRole::Unknown).await;
                    } else {
                        self.renewal_failing.store(true, Ordering::Release);
                    }
                }
                return Err(e);
            }
        };
        self.renewal_failing.store(false, Ordering::Release);

        match (current, outcome) {
            (PeerRole::Leader { .. }, LeaseOutcome::Granted { generation, expires_at }) => {
                self.metrics.record_lease_renewed();
                *self.role.write() = PeerRole::Leader { generation, expires_at };
                debug!(actor_id = %self.actor_id, generation, "Lease renewed");
            }
            (PeerRole::Leader { .. }, LeaseOutcome::Denied { holder, generation, .. }) => {
                self.lose_leadership(PeerRole::Follower {
                    leader: holder,
                    generation,
                })
                .await;
            }
            (_, LeaseOutcome::Granted { generation, expires_at }) => {
                self.become_leader(generation, expires_at).await?;
            }
            (previous, LeaseOutcome::Denied { holder, generation, .. }) => {
                let next = PeerRole::Follower {
                    leader: holder,
                    generation,
                };
                if previous != next {
                    debug!(actor_id = %self.actor_id, leader = %next.leader(&self.node_id).map(NodeId::as_str).unwrap_or("-"), generation, "Following leaseholder");
                    *self.role.write() = next;
                    self.announce();
                }
            }
        }
        Ok(())
    }

    async fn become_leader(&self, generation: u64, expires_at: Timestamp) -> CoordinateResult<()> {
        // The actor is loaded from persistence before anyone is routed here
        if let Err(e) = self.manager.instance(&self.actor_id).await {
            warn!(actor_id = %self.actor_id, error = %e, "Failed to start actor after acquiring lease");
            if let Err(release) = self
                .store
                .release_lease(&self.actor_id, &self.node_id, generation)
                .await
            {
                warn!(actor_id = %self.actor_id, error = %release, "Failed to release lease");
            }
            *self.role.write() = PeerRole::Unknown;
            return Err(e.into());
        }

        *self.role.write() = PeerRole::Leader { generation, expires_at };
        self.metrics.record_lease_acquired();
        info!(actor_id = %self.actor_id, node_id = %self.node_id, generation, "Lease acquired, actor is local");
        self.announce();
        Ok(())
    }

    async fn lose_leadership(&self, next: PeerRole) {
        *self.role.write() = next.clone();
        self.metrics.record_lease_lost();
        warn!(
            actor_id = %self.actor_id,
            node_id = %self.node_id,
            new_leader = %next.leader(&self.node_id).map(NodeId::as_str).unwrap_or("-"),
            "Lease lost, stopping local actor"
        );
        self.manager
            .stop_instance(&self.actor_id, StopReason::LeaseLost)
            .await;
        self.announce();
    }

    fn announce(&self) {
        let role = self.role();
        let _ = self.events.send(LeaderChanged {
            actor_id: self.actor_id.clone(),
            leader: role.leader(&self.node_id).cloned(),
            generation: role.generation(),
        });
    }

    /// Stop the local actor gracefully and hand the lease back
    pub async fn release(&self) {
        self.stop_heartbeat();
        let _transition = self.transition.lock().await;
        let role = std::mem::replace(&mut *self.role.write(), PeerRole::Unknown);
        if let PeerRole::Leader { generation, .. } = role {
            self.manager
                .stop_instance(&self.actor_id, StopReason::Graceful)
                .await;
            match self
                .store
                .release_lease(&self.actor_id, &self.node_id, generation)
                .await
            {
                Ok(true) => {
                    self.metrics.record_lease_released();
                    info!(actor_id = %self.actor_id, generation, "Lease released");
                }
                Ok(false) => debug!(actor_id = %self.actor_id, generation, "Lease already moved on"),
                Err(e) => warn!(actor_id = %self.actor_id, error = %e, "Failed to release lease"),
            }
        }
    }

    /// Stop checking without touching the lease
    pub fn stop_heartbeat(&self) {
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for ActorPeer {
    fn drop(&mut self) {
        if let Some(handle) = self.heartbeat.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for ActorPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorPeer")
            .field("actor_id", &self.actor_id)
            .field("node_id", &self.node_id)
            .field("role", &*self.role.read())
            .finish()
    }
}
