//! Coordinate Node
//!
//! Turns one [`Manager`] into a member of a multi-node topology. Every node
//! accepts client connections for any actor; only the leaseholder runs it.
//!
//! ```text
//!  client ──▶ follower node ── ForwardOpen / ForwardMessage ──▶ leader node
//!                 ▲                                                │
//!                 └──────────── RelayAck, ToFollowerFrame ─────────┘
//!                         (CoordinateStore pub/sub)
//! ```
//!
//! ## Tasks
//!
//! - **inbound**: decodes envelopes published to this node and dispatches them
//! - **outbound**: publishes envelopes in order; acks never overtake frames
//! - **events**: closes relayed client links when an actor's leader changes
//!
//! Every forward waits for a [`NodeBody::RelayAck`] for
//! `coordinate.message_ack_timeout_ms`. Handshakes and closes are retried
//! `coordinate.relay_retries` times; client messages never are, since they
//! may carry an action that must not run twice. Retries of a handshake that
//! is still running on the leader join it instead of connecting again.
//! Heartbeats are forwarded without an ack.

use actor_runtime::{
    ActorError, ActorHandle, ConnectRequest, ConnectionDriver, Manager, OwnerEndpoint,
    Result as ActorResult,
};
use codec::{
    AckOutcome, Encoding, Frame, NodeBody, NodeEnvelope, ReconnectCredential, ToClient,
    ToServer, ToServerBody,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use types::{ActorId, ActorQuery, ConnectionId, ConnectionToken, NodeId};

use crate::directory::LeaseDirectory;
use crate::error::{CoordinateError, CoordinateResult};
use crate::metrics::CoordinateMetrics;
use crate::peer::{ActorPeer, LeaderChanged, PeerRole};
use crate::relay::{HostedCommand, HostedLink, HostedLinks, Outbound, OutboundTx, RelayedDriver};
use crate::store::CoordinateStore;

const REASON_LEADER_CHANGED: &str = "leader changed";
const REASON_NODE_STOPPED: &str = "node stopped";

/// Client link accepted on this node
#[derive(Clone)]
enum ClientLink {
    /// The actor runs here; the link id is the connection id
    Local {
        actor_id: ActorId,
        handle: Arc<dyn ActorHandle>,
    },
    /// The actor runs on `leader`; frames are forwarded
    Relay(RelayLink),
}

#[derive(Clone)]
struct RelayLink {
    actor_id: ActorId,
    leader: NodeId,
    generation: u64,
    driver: Arc<dyn ConnectionDriver>,
    encoding: Encoding,
}

type PeerSlot = Arc<OnceCell<Arc<ActorPeer>>>;

/// Outcome of a relayed handshake, shared by its retries
type OpeningSlot = Arc<OnceCell<AckOutcome>>;

pub(crate) struct NodeInner {
    node_id: NodeId,
    manager: Arc<Manager>,
    store: Arc<dyn CoordinateStore>,
    metrics: Arc<CoordinateMetrics>,
    peers: DashMap<ActorId, PeerSlot>,
    links: DashMap<ConnectionId, ClientLink>,
    hosted: HostedLinks,
    opening: DashMap<ConnectionId, OpeningSlot>,
    pending_acks: DashMap<u64, oneshot::Sender<AckOutcome>>,
    outbound: OutboundTx,
    events: mpsc::UnboundedSender<LeaderChanged>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Handle to a running coordinate node
#[derive(Clone)]
pub struct CoordinateNode {
    inner: Arc<NodeInner>,
}

impl CoordinateNode {
    /// Subscribe to the node channel and take over actor placement for `manager`
    pub async fn start(manager: Arc<Manager>, store: Arc<dyn CoordinateStore>) -> CoordinateResult<Self> {
        let node_id = manager.node_id().clone();
        let inbound = store.subscribe(&node_id).await?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(NodeInner {
            node_id: node_id.clone(),
            manager: manager.clone(),
            store: store.clone(),
            metrics: Arc::new(CoordinateMetrics::default()),
            peers: DashMap::new(),
            links: DashMap::new(),
            hosted: Arc::new(DashMap::new()),
            opening: DashMap::new(),
            pending_acks: DashMap::new(),
            outbound: outbound_tx,
            events: events_tx,
            tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        *inner.tasks.lock() = vec![
            tokio::spawn(run_outbound(store, outbound_rx)),
            tokio::spawn(NodeInner::run_inbound(Arc::downgrade(&inner), inbound)),
            tokio::spawn(NodeInner::run_events(Arc::downgrade(&inner), events_rx)),
        ];
        manager.set_directory(Arc::new(LeaseDirectory::new(Arc::downgrade(&inner))));

        info!(node_id = %node_id, "Coordinate node started");
        Ok(Self { inner })
    }

    pub fn node_id(&self) -> &NodeId {
        &self.inner.node_id
    }

    pub fn manager(&self) -> &Arc<Manager> {
        &self.inner.manager
    }

    pub fn metrics(&self) -> &Arc<CoordinateMetrics> {
        &self.inner.metrics
    }

    /// Leaseholder of `actor_id` as last observed, without a store round trip
    pub fn leader_of(&self, actor_id: &ActorId) -> Option<NodeId> {
        self.inner.live_peer(actor_id).and_then(|peer| peer.leader())
    }

    pub fn is_leader(&self, actor_id: &ActorId) -> bool {
        self.inner
            .live_peer(actor_id)
            .map(|peer| peer.is_leader())
            .unwrap_or(false)
    }

    /// Owner of `actor_id`, joining its lease if this node has not yet
    pub async fn locate(&self, actor_id: &ActorId) -> ActorResult<OwnerEndpoint> {
        self.inner.locate(actor_id).await
    }

    /// Resolve `query` and open a client link on whichever node owns the actor
    ///
    /// Returns the link id used with [`send`](Self::send) and
    /// [`close`](Self::close). The client learns its connection id and
    /// token from the `Init` frame, as with a local connection.
    pub async fn connect(&self, query: &ActorQuery, request: ConnectRequest) -> ActorResult<ConnectionId> {
        self.inner.ensure_open()?;
        let actor_id = self.inner.manager.resolve(query, None).await?;
        self.inner.connect_actor(&actor_id, request).await
    }

    /// Deliver one client frame
    ///
    /// A relayed frame that is not acknowledged in time fails with
    /// `RelayTimeout`; if it was an action request the client also receives
    /// a `relay_timeout` error for that action id.
    pub async fn send(&self, link_id: &ConnectionId, frame: Frame) -> ActorResult<()> {
        let link = self.inner.link(link_id)?;
        match link {
            ClientLink::Local { handle, .. } => handle.process_message(link_id, frame).await,
            ClientLink::Relay(relay) => {
                let body = NodeBody::ForwardMessage {
                    actor_id: relay.actor_id.clone(),
                    conn_id: link_id.clone(),
                    frame: frame.clone(),
                };
                let result = self.inner.forward(&relay.actor_id, &relay.leader, body, 0).await;
                if let Err(err) = &result {
                    self.inner.answer_unacknowledged(link_id, &relay, &frame, err);
                }
                result
            }
        }
    }

    /// Heartbeat from the client
    ///
    /// Relayed heartbeats are forwarded to the leader without waiting for an
    /// ack; `true` only means the link is known here.
    pub fn touch(&self, link_id: &ConnectionId) -> bool {
        match self.inner.link(link_id) {
            Ok(ClientLink::Local { handle, .. }) => handle.touch(link_id),
            Ok(ClientLink::Relay(relay)) => {
                let body = NodeBody::ForwardTouch {
                    actor_id: relay.actor_id,
                    conn_id: link_id.clone(),
                };
                self.inner
                    .outbound
                    .send(Outbound {
                        target: relay.leader,
                        envelope: NodeEnvelope::new(self.inner.node_id.clone(), body),
                    })
                    .is_ok()
            }
            Err(_) => false,
        }
    }

    /// Client asked to disconnect; idempotent
    pub async fn close(&self, link_id: &ConnectionId, reason: Option<String>) -> ActorResult<()> {
        let Some((_, link)) = self.inner.links.remove(link_id) else {
            return Ok(());
        };
        match link {
            ClientLink::Local { handle, .. } => match handle.disconnect(link_id, reason).await {
                Err(ActorError::ConnectionNotFound { .. }) => Ok(()),
                other => other,
            },
            ClientLink::Relay(relay) => {
                let retries = self.inner.manager.config().coordinate.relay_retries;
                let body = NodeBody::ForwardClose {
                    actor_id: relay.actor_id.clone(),
                    conn_id: link_id.clone(),
                    reason,
                };
                self.inner
                    .forward(&relay.actor_id, &relay.leader, body, retries)
                    .await
            }
        }
    }

    /// The client transport dropped without a close; the connection stays
    /// on the leader so it can be resumed with its token
    pub fn detach(&self, link_id: &ConnectionId) {
        match self.inner.links.remove(link_id) {
            Some((_, ClientLink::Local { actor_id, handle })) => {
                debug!(actor_id = %actor_id, link_id = %link_id, "Local client link detached");
                handle.transport_closed(link_id);
            }
            Some((_, ClientLink::Relay(relay))) => {
                debug!(actor_id = %relay.actor_id, link_id = %link_id, leader = %relay.leader, "Relayed client link detached");
            }
            None => {}
        }
    }

    /// Stop local actors gracefully, release their leases and leave
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(node_id = %self.inner.node_id, "Coordinate node shutting down");

        for peer in self.inner.take_peers() {
            peer.release().await;
        }
        self.inner.manager.shutdown().await;
        self.inner.close_relays(|_| true, REASON_NODE_STOPPED).await;
        self.inner.links.clear();
        self.inner.stop_tasks();
        info!(node_id = %self.inner.node_id, "Coordinate node stopped");
    }

    /// Stop abruptly: no graceful hooks, no lease release, no more messages
    ///
    /// Local actors are fenced so they never write again; other nodes only
    /// notice once the leases expire.
    pub async fn crash(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        warn!(node_id = %self.inner.node_id, "Coordinate node crashing");
        self.inner.stop_tasks();
        for peer in self.inner.take_peers() {
            peer.stop_heartbeat();
        }
        for actor_id in self.inner.manager.running_actors() {
            self.inner
                .manager
                .stop_instance(&actor_id, actor_runtime::StopReason::LeaseLost)
                .await;
        }
        self.inner.hosted.clear();
        self.inner.close_relays(|_| true, REASON_NODE_STOPPED).await;
        self.inner.links.clear();
    }
}

impl NodeInner {
    fn ensure_open(&self) -> ActorResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoordinateError::Shutdown.into());
        }
        Ok(())
    }

    fn link(&self, link_id: &ConnectionId) -> ActorResult<ClientLink> {
        self.links
            .get(link_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ActorError::ConnectionNotFound {
                conn_id: link_id.to_string(),
            })
    }

    fn live_peer(&self, actor_id: &ActorId) -> Option<Arc<ActorPeer>> {
        self.peers
            .get(actor_id)
            .and_then(|slot| slot.value().get().cloned())
    }

    fn take_peers(&self) -> Vec<Arc<ActorPeer>> {
        let actor_ids: Vec<ActorId> = self.peers.iter().map(|entry| entry.key().clone()).collect();
        actor_ids
            .into_iter()
            .filter_map(|actor_id| self.peers.remove(&actor_id))
            .filter_map(|(_, slot)| slot.get().cloned())
            .collect()
    }

    fn stop_tasks(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        // Waiting forwards fail instead of timing out
        self.pending_acks.clear();
    }

    /// Peer for `actor_id`, joining the lease on first use
    async fn peer(&self, actor_id: &ActorId) -> ActorResult<Arc<ActorPeer>> {
        self.ensure_open()?;
        let slot = self.peers.entry(actor_id.clone()).or_default().clone();
        let started = slot
            .get_or_try_init(|| {
                ActorPeer::start(
                    actor_id.clone(),
                    self.store.clone(),
                    self.manager.clone(),
                    self.metrics.clone(),
                    self.events.clone(),
                )
            })
            .await;
        match started {
            Ok(peer) => Ok(peer.clone()),
            Err(err) => {
                self.peers
                    .remove_if(actor_id, |_, existing| Arc::ptr_eq(existing, &slot) && existing.get().is_none());
                Err(err.into())
            }
        }
    }

    pub(crate) async fn locate(&self, actor_id: &ActorId) -> ActorResult<OwnerEndpoint> {
        let peer = self.peer(actor_id).await?;
        match peer.leader() {
            Some(leader) => Ok(OwnerEndpoint {
                is_local: leader == self.node_id,
                node_id: leader,
            }),
            None => {
                peer.suspect();
                Err(ActorError::LeaseConflict {
                    actor_id: actor_id.to_string(),
                })
            }
        }
    }

    /// Local instance of an actor this node holds the lease for
    pub(crate) async fn owned_instance(&self, actor_id: &ActorId) -> ActorResult<Arc<dyn ActorHandle>> {
        let peer = self.peer(actor_id).await?;
        if peer.leader().is_none() {
            peer.suspect();
        }
        peer.leader_instance().await
    }

    async fn connect_actor(&self, actor_id: &ActorId, request: ConnectRequest) -> ActorResult<ConnectionId> {
        let peer = self.peer(actor_id).await?;
        match peer.role() {
            PeerRole::Leader { .. } => {
                let handle = peer.leader_instance().await?;
                let conn = handle.connect(request).await?;
                self.links.insert(
                    conn.id().clone(),
                    ClientLink::Local {
                        actor_id: actor_id.clone(),
                        handle,
                    },
                );
                Ok(conn.id().clone())
            }
            PeerRole::Follower { leader, generation } => {
                self.connect_relay(actor_id, leader, generation, request).await
            }
            PeerRole::Unknown => {
                peer.suspect();
                Err(ActorError::LeaseConflict {
                    actor_id: actor_id.to_string(),
                })
            }
        }
    }

    async fn connect_relay(
        &self,
        actor_id: &ActorId,
        leader: NodeId,
        generation: u64,
        request: ConnectRequest,
    ) -> ActorResult<ConnectionId> {
        let ConnectRequest {
            params,
            encoding,
            driver,
            reconnect,
        } = request;
        let link_id = ConnectionId::generate();
        let relay = RelayLink {
            actor_id: actor_id.clone(),
            leader: leader.clone(),
            generation,
            driver,
            encoding,
        };

        // Registered first: the leader's Init frame can arrive before its ack
        self.links
            .insert(link_id.clone(), ClientLink::Relay(relay.clone()));

        let body = NodeBody::ForwardOpen {
            actor_id: actor_id.clone(),
            conn_id: link_id.clone(),
            encoding,
            params: serde_json::to_string(&params)?,
            reconnect: reconnect.map(|credential| ReconnectCredential {
                connection_id: credential.connection_id,
                token: credential.token.expose().to_string(),
            }),
        };
        let retries = self.manager.config().coordinate.relay_retries;
        match self.forward(actor_id, &leader, body, retries).await {
            Ok(()) => {
                debug!(actor_id = %actor_id, link_id = %link_id, leader = %leader, "Relayed connection opened");
                Ok(link_id)
            }
            Err(err) => {
                // Rejections already closed the link through ToFollowerClose
                if self.links.remove(&link_id).is_some() {
                    self.fail_link(&link_id, &relay, &err, None).await;
                }
                Err(err)
            }
        }
    }

    /// Forward `body` to `leader` and wait for its ack
    async fn forward(&self, actor_id: &ActorId, leader: &NodeId, body: NodeBody, retries: u32) -> ActorResult<()> {
        let timeout = self.manager.config().coordinate.message_ack_timeout();
        let kind = body.kind();

        for attempt in 0..=retries {
            self.ensure_open()?;
            let envelope = NodeEnvelope::new(self.node_id.clone(), body.clone());
            let message_id = envelope.message_id;
            let (ack_tx, ack_rx) = oneshot::channel();
            self.pending_acks.insert(message_id, ack_tx);
            self.metrics.record_forward(attempt);

            if self
                .outbound
                .send(Outbound {
                    target: leader.clone(),
                    envelope,
                })
                .is_err()
            {
                self.pending_acks.remove(&message_id);
                return Err(CoordinateError::Shutdown.into());
            }

            match tokio::time::timeout(timeout, ack_rx).await {
                Ok(Ok(AckOutcome::Ok)) => return Ok(()),
                Ok(Ok(AckOutcome::Rejected { code, message })) => {
                    self.metrics.record_relay_rejection();
                    debug!(actor_id = %actor_id, leader = %leader, kind, code = %code, "Forward rejected");
                    return Err(rejection(actor_id, code, message));
                }
                Ok(Err(_)) => return Err(CoordinateError::Shutdown.into()),
                Err(_) => {
                    self.pending_acks.remove(&message_id);
                    self.metrics.record_relay_timeout();
                    warn!(
                        actor_id = %actor_id,
                        leader = %leader,
                        kind,
                        attempt,
                        timeout_ms = timeout.as_millis() as u64,
                        "Relay ack timed out"
                    );
                }
            }
        }

        if let Some(peer) = self.live_peer(actor_id) {
            peer.suspect();
        }
        Err(ActorError::relay_timeout(leader.to_string(), timeout.as_millis() as u64))
    }

    /// Send an error frame to a relayed client and close its link
    async fn fail_link(&self, link_id: &ConnectionId, relay: &RelayLink, err: &ActorError, related_action_id: Option<u64>) {
        let expose = self.manager.config().protocol.expose_internal_errors;
        let wire = err.to_wire(expose);
        let frame = ToClient::error(wire.code, wire.message, wire.metadata, related_action_id);
        match relay.encoding.encode(&frame) {
            Ok(encoded) => {
                let _ = relay.driver.send(link_id, encoded);
            }
            Err(e) => warn!(link_id = %link_id, error = %e, "Failed to encode relay error"),
        }
        if related_action_id.is_none() {
            relay.driver.close(link_id, Some(err.code().to_string())).await;
        }
    }

    /// Answer an action whose forward was never acknowledged
    fn answer_unacknowledged(&self, link_id: &ConnectionId, relay: &RelayLink, frame: &Frame, err: &ActorError) {
        let Ok(message) = relay.encoding.decode::<ToServer>(frame, usize::MAX) else {
            return;
        };
        if let ToServerBody::ActionRequest(request) = message.body {
            let expose = self.manager.config().protocol.expose_internal_errors;
            let wire = err.to_wire(expose);
            let reply = ToClient::error(wire.code, wire.message, wire.metadata, Some(request.id));
            if let Ok(encoded) = relay.encoding.encode(&reply) {
                let _ = relay.driver.send(link_id, encoded);
            }
        }
    }

    fn ack(&self, target: &NodeId, ack_for: u64, outcome: AckOutcome) {
        let _ = self.outbound.send(Outbound {
            target: target.clone(),
            envelope: NodeEnvelope::ack(self.node_id.clone(), ack_for, outcome),
        });
    }

    fn rejected(&self, err: &ActorError) -> AckOutcome {
        let wire = err.to_wire(self.manager.config().protocol.expose_internal_errors);
        AckOutcome::Rejected {
            code: wire.code,
            message: wire.message,
        }
    }

    async fn run_inbound(node: Weak<NodeInner>, mut inbound: mpsc::UnboundedReceiver<bytes::Bytes>) {
        while let Some(payload) = inbound.recv().await {
            let Some(node) = node.upgrade() else { break };
            match NodeEnvelope::decode(&payload) {
                Ok(envelope) => node.handle_envelope(envelope).await,
                Err(e) => warn!(node_id = %node.node_id, error = %e, "Dropping undecodable node message"),
            }
        }
    }

    async fn handle_envelope(self: &Arc<Self>, envelope: NodeEnvelope) {
        let NodeEnvelope {
            message_id,
            source_node,
            body,
            ..
        } = envelope;

        match body {
            NodeBody::ForwardOpen {
                actor_id,
                conn_id,
                encoding,
                params,
                reconnect,
            } => {
                // Handshakes run hooks; keep the inbound loop moving
                let node = self.clone();
                let slot = self.opening.entry(conn_id.clone()).or_default().clone();
                tokio::spawn(async move {
                    let outcome = slot
                        .get_or_init(|| {
                            node.accept_open(&source_node, actor_id, conn_id.clone(), encoding, params, reconnect)
                        })
                        .await
                        .clone();
                    node.opening
                        .remove_if(&conn_id, |_, existing| Arc::ptr_eq(existing, &slot));
                    node.ack(&source_node, message_id, outcome);
                });
            }
            NodeBody::ForwardMessage { conn_id, frame, .. } => {
                let outcome = match self.hosted.get(&conn_id) {
                    Some(link) if link.follower == source_node && link.push(HostedCommand::Frame(frame)) => {
                        debug!(actor_id = %link.actor_id, link_id = %conn_id, "Relayed frame queued");
                        AckOutcome::Ok
                    }
                    _ => self.rejected(&ActorError::ConnectionNotFound {
                        conn_id: conn_id.to_string(),
                    }),
                };
                self.ack(&source_node, message_id, outcome);
            }
            NodeBody::ForwardTouch { conn_id, .. } => match self.hosted.get(&conn_id) {
                Some(link) if link.follower == source_node => {
                    if !link.touch() {
                        debug!(actor_id = %link.actor_id, link_id = %conn_id, "Relayed heartbeat for a closed connection");
                    }
                }
                _ => debug!(link_id = %conn_id, follower = %source_node, "Relayed heartbeat for an unknown link"),
            },
            NodeBody::ForwardClose { conn_id, reason, .. } => {
                if let Some((_, link)) = self.hosted.remove(&conn_id) {
                    link.push(HostedCommand::Close(reason));
                }
                self.ack(&source_node, message_id, AckOutcome::Ok);
            }
            NodeBody::RelayAck { ack_for, outcome } => {
                if let Some((_, waiter)) = self.pending_acks.remove(&ack_for) {
                    let _ = waiter.send(outcome);
                }
            }
            NodeBody::ToFollowerFrame { conn_id, frame } => {
                if let Ok(ClientLink::Relay(relay)) = self.link(&conn_id) {
                    if let Err(e) = relay.driver.send(&conn_id, frame) {
                        debug!(link_id = %conn_id, error = %e, "Client link gone");
                    }
                }
            }
            NodeBody::ToFollowerClose { conn_id, reason } => {
                let removed = self
                    .links
                    .remove_if(&conn_id, |_, link| matches!(link, ClientLink::Relay(_)));
                if let Some((_, ClientLink::Relay(relay))) = removed {
                    relay.driver.close(&conn_id, reason).await;
                }
            }
        }
    }

    async fn accept_open(
        &self,
        follower: &NodeId,
        actor_id: ActorId,
        link_id: ConnectionId,
        encoding: Encoding,
        params: String,
        reconnect: Option<ReconnectCredential>,
    ) -> AckOutcome {
        // Retried handshake whose first ack was lost
        if self.hosted.contains_key(&link_id) {
            return AckOutcome::Ok;
        }

        let result: ActorResult<()> = async {
            let handle = self.peer(&actor_id).await?.leader_instance().await?;
            let params: Value = serde_json::from_str(&params)?;
            let driver = Arc::new(RelayedDriver::new(
                link_id.clone(),
                follower.clone(),
                self.node_id.clone(),
                self.outbound.clone(),
                self.hosted.clone(),
                self.metrics.clone(),
            ));
            let mut request = ConnectRequest::new(params, encoding, driver);
            if let Some(credential) = reconnect {
                request = request.with_reconnect(
                    credential.connection_id,
                    ConnectionToken::from_client(credential.token),
                );
            }
            let conn = handle.connect(request).await?;
            let link = HostedLink::spawn(actor_id.clone(), follower.clone(), handle, conn.id().clone());
            self.hosted.insert(link_id.clone(), link);
            info!(actor_id = %actor_id, link_id = %link_id, conn_id = %conn.id(), follower = %follower, "Accepted relayed connection");
            Ok(())
        }
        .await;

        match result {
            Ok(()) => AckOutcome::Ok,
            Err(err) => {
                debug!(actor_id = %actor_id, link_id = %link_id, error = %err, "Relayed handshake rejected");
                self.rejected(&err)
            }
        }
    }

    async fn run_events(node: Weak<NodeInner>, mut events: mpsc::UnboundedReceiver<LeaderChanged>) {
        while let Some(change) = events.recv().await {
            let Some(node) = node.upgrade() else { break };
            info!(
                node_id = %node.node_id,
                actor_id = %change.actor_id,
                leader = %change.leader.as_ref().map(NodeId::as_str).unwrap_or("-"),
                generation = ?change.generation,
                "Leader changed"
            );
            let stale = |relay: &RelayLink| {
                relay.actor_id == change.actor_id
                    && (Some(&relay.leader) != change.leader.as_ref() || Some(relay.generation) != change.generation)
            };
            let closed = node.close_relays(stale, REASON_LEADER_CHANGED).await;
            node.metrics.record_relays_closed(closed);
        }
    }

    /// Close every relayed client link matching `filter`
    async fn close_relays(&self, filter: impl Fn(&RelayLink) -> bool, reason: &str) -> usize {
        let stale: Vec<ConnectionId> = self
            .links
            .iter()
            .filter(|entry| matches!(entry.value(), ClientLink::Relay(relay) if filter(relay)))
            .map(|entry| entry.key().clone())
            .collect();

        let mut closed = 0;
        for link_id in stale {
            if let Some((_, ClientLink::Relay(relay))) = self.links.remove(&link_id) {
                relay.driver.close(&link_id, Some(reason.to_string())).await;
                closed += 1;
            }
        }
        closed
    }
}

async fn run_outbound(store: Arc<dyn CoordinateStore>, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(Outbound { target, envelope }) = outbound.recv().await {
        let kind = envelope.body.kind();
        match envelope.encode() {
            Ok(payload) => {
                if let Err(e) = store.publish(&target, payload).await {
                    warn!(target = %target, kind, error = %e, "Failed to publish node message");
                }
            }
            Err(e) => error!(target = %target, kind, error = %e, "Failed to encode node message"),
        }
    }
}

/// Error for a forward the leader refused
fn rejection(actor_id: &ActorId, code: String, message: String) -> ActorError {
    match code.as_str() {
        "lease_conflict" => ActorError::LeaseConflict {
            actor_id: actor_id.to_string(),
        },
        "actor_stopped" => ActorError::ActorStopped {
            actor_id: actor_id.to_string(),
        },
        "unauthorized" => ActorError::Unauthorized { reason: message },
        "connection_rejected" => ActorError::ConnectionRejected { reason: message },
        "conn_not_found" => ActorError::ConnectionNotFound { conn_id: message },
        "internal_error" => ActorError::internal(message),
        _ => ActorError::user_with(code, message, None),
    }
}
