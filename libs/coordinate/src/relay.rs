//! Leader-side half of a relayed connection.
//!
//! When a follower forwards a handshake, the leader opens a normal actor
//! connection whose driver is a [`RelayedDriver`]: every outgoing client
//! frame becomes a `ToFollowerFrame` envelope addressed to the follower that
//! owns the client link. Inbound frames for the link are queued on a
//! [`HostedLink`] and processed in arrival order. Heartbeats skip the queue
//! so a slow action never delays them.

use actor_runtime::{ActorError, ActorHandle, ConnectionDriver, Result as ActorResult};
use async_trait::async_trait;
use codec::{Frame, NodeBody, NodeEnvelope};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use types::{ActorId, ConnectionId, NodeId};

use crate::metrics::CoordinateMetrics;

/// Envelope waiting to be published
#[derive(Debug)]
pub(crate) struct Outbound {
    pub target: NodeId,
    pub envelope: NodeEnvelope,
}

pub(crate) type OutboundTx = mpsc::UnboundedSender<Outbound>;

/// Relayed connections hosted on this node, keyed by the follower's link id
pub(crate) type HostedLinks = Arc<DashMap<ConnectionId, HostedLink>>;

pub(crate) enum HostedCommand {
    Frame(Frame),
    Close(Option<String>),
}

pub(crate) struct HostedLink {
    pub actor_id: ActorId,
    pub follower: NodeId,
    handle: Arc<dyn ActorHandle>,
    conn_id: ConnectionId,
    commands: mpsc::UnboundedSender<HostedCommand>,
}

impl HostedLink {
    /// Start the worker that feeds the link's frames to the actor
    pub fn spawn(
        actor_id: ActorId,
        follower: NodeId,
        handle: Arc<dyn ActorHandle>,
        conn_id: ConnectionId,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_hosted(handle.clone(), conn_id.clone(), rx));
        Self {
            actor_id,
            follower,
            handle,
            conn_id,
            commands,
        }
    }

    pub fn push(&self, command: HostedCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Refresh the actor connection's liveness
    pub fn touch(&self) -> bool {
        self.handle.touch(&self.conn_id)
    }
}

async fn run_hosted(
    handle: Arc<dyn ActorHandle>,
    conn_id: ConnectionId,
    mut commands: mpsc::UnboundedReceiver<HostedCommand>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            HostedCommand::Frame(frame) => {
                if let Err(e) = handle.process_message(&conn_id, frame).await {
                    debug!(conn_id = %conn_id, error = %e, "Relayed frame not processed");
                }
            }
            HostedCommand::Close(reason) => {
                if let Err(e) = handle.disconnect(&conn_id, reason).await {
                    debug!(conn_id = %conn_id, error = %e, "Relayed close not processed");
                }
                break;
            }
        }
    }
}

/// Connection driver that routes client frames back through a follower
pub(crate) struct RelayedDriver {
    link_id: ConnectionId,
    follower: NodeId,
    local: NodeId,
    outbound: OutboundTx,
    hosted: HostedLinks,
    metrics: Arc<CoordinateMetrics>,
}

impl RelayedDriver {
    pub fn new(
        link_id: ConnectionId,
        follower: NodeId,
        local: NodeId,
        outbound: OutboundTx,
        hosted: HostedLinks,
        metrics: Arc<CoordinateMetrics>,
    ) -> Self {
        Self {
            link_id,
            follower,
            local,
            outbound,
            hosted,
            metrics,
        }
    }

    fn publish(&self, body: NodeBody) -> bool {
        self.outbound
            .send(Outbound {
                target: self.follower.clone(),
                envelope: NodeEnvelope::new(self.local.clone(), body),
            })
            .is_ok()
    }
}

#[async_trait]
impl ConnectionDriver for RelayedDriver {
    fn send(&self, _conn_id: &ConnectionId, frame: Frame) -> ActorResult<()> {
        let sent = self.publish(NodeBody::ToFollowerFrame {
            conn_id: self.link_id.clone(),
            frame,
        });
        if !sent {
            return Err(ActorError::ConnectionNotFound {
                conn_id: self.link_id.to_string(),
            });
        }
        self.metrics.record_frame_to_follower();
        Ok(())
    }

    async fn close(&self, _conn_id: &ConnectionId, reason: Option<String>) {
        self.hosted.remove(&self.link_id);
        debug!(link_id = %self.link_id, follower = %self.follower, reason = ?reason, "Closing relayed link");
        self.publish(NodeBody::ToFollowerClose {
            conn_id: self.link_id.clone(),
            reason,
        });
    }
}
