//! Type-erased access to a running actor.
//!
//! The manager, the coordinate relay and transports hold actors as
//! `Arc<dyn ActorHandle>` without knowing their state or vars types.

use async_trait::async_trait;
use codec::{Encoding, Frame};
use serde_json::Value;
use std::sync::Arc;
use types::{ActorId, ActorQuery, ConnectionId, ConnectionToken};

use crate::connection::Connection;
use crate::driver::ConnectionDriver;
use crate::error::Result;

/// Actor status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorStatus {
    Created,
    Loading,
    Running,
    Stopping,
    Stopped,
}

/// Why an actor is being stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown or release: disconnect everyone, persist, run `on_stop`
    Graceful,
    /// Another node owns the actor now; no further writes are allowed
    LeaseLost,
}

/// Credentials presented to resume an existing connection
#[derive(Debug, Clone)]
pub struct Reconnect {
    pub connection_id: ConnectionId,
    pub token: ConnectionToken,
}

/// Handshake request
pub struct ConnectRequest {
    pub params: Value,
    pub encoding: Encoding,
    pub driver: Arc<dyn ConnectionDriver>,
    pub reconnect: Option<Reconnect>,
}

impl ConnectRequest {
    pub fn new(params: Value, encoding: Encoding, driver: Arc<dyn ConnectionDriver>) -> Self {
        Self {
            params,
            encoding,
            driver,
            reconnect: None,
        }
    }

    pub fn with_reconnect(mut self, connection_id: ConnectionId, token: ConnectionToken) -> Self {
        self.reconnect = Some(Reconnect {
            connection_id,
            token,
        });
        self
    }
}

#[async_trait]
pub trait ActorHandle: Send + Sync {
    fn actor_id(&self) -> &ActorId;

    fn query(&self) -> &ActorQuery;

    fn status(&self) -> ActorStatus;

    /// Run the handshake; the `Init` frame has been sent when this returns
    async fn connect(&self, request: ConnectRequest) -> Result<Arc<Connection>>;

    /// Handle one inbound client frame
    ///
    /// Frame-level problems are answered on the connection; `Err` is only
    /// returned when the connection or the actor is gone.
    async fn process_message(&self, conn_id: &ConnectionId, frame: Frame) -> Result<()>;

    /// Run an action without a caller connection
    async fn execute_action(&self, name: &str, args: Vec<Value>) -> Result<Value>;

    /// Heartbeat; returns whether the connection is known
    fn touch(&self, conn_id: &ConnectionId) -> bool;

    /// The transport dropped without a close; keep the connection for reconnects
    fn transport_closed(&self, conn_id: &ConnectionId);

    /// Tear a connection down, running `on_disconnect` once
    async fn disconnect(&self, conn_id: &ConnectionId, reason: Option<String>) -> Result<()>;

    async fn stop(&self, reason: StopReason);

    fn connection(&self, conn_id: &ConnectionId) -> Option<Arc<Connection>>;

    fn connection_count(&self) -> usize;
}
