//! Connection Transport Port
//!
//! The runtime never touches sockets. Each connection carries a driver that
//! knows how to push a frame to the client and how to close the link; a
//! websocket server, an SSE bridge or the coordinate relay all plug in here.

use async_trait::async_trait;
use codec::Frame;
use std::sync::Arc;
use tokio::sync::mpsc;
use types::ConnectionId;

use crate::error::{ActorError, Result};

/// Outbound half of one client link
#[async_trait]
pub trait ConnectionDriver: Send + Sync {
    /// Queue a frame for delivery; must not block
    fn send(&self, conn_id: &ConnectionId, frame: Frame) -> Result<()>;

    /// Close the link, optionally telling the client why
    async fn close(&self, conn_id: &ConnectionId, reason: Option<String>);
}

/// What a [`ChannelDriver`] delivered
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    Frame(Frame),
    Closed { reason: Option<String> },
}

/// Driver that forwards everything into an unbounded channel
///
/// Used by in-process transports and by tests acting as a client.
#[derive(Debug)]
pub struct ChannelDriver {
    tx: mpsc::UnboundedSender<DriverEvent>,
}

impl ChannelDriver {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DriverEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl ConnectionDriver for ChannelDriver {
    fn send(&self, conn_id: &ConnectionId, frame: Frame) -> Result<()> {
        self.tx
            .send(DriverEvent::Frame(frame))
            .map_err(|_| ActorError::ConnectionNotFound {
                conn_id: conn_id.to_string(),
            })
    }

    async fn close(&self, _conn_id: &ConnectionId, reason: Option<String>) {
        let _ = self.tx.send(DriverEvent::Closed { reason });
    }
}
