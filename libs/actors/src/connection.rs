//! Connection
//!
//! One logical client link to an actor. A connection outlives its transport:
//! when the socket drops the driver is detached and the connection waits in
//! `Connecting` for a reconnect carrying its id and token, until the
//! liveness sweep evicts it.
//!
//! ```text
//!             attach                begin_disconnect         mark_disconnected
//! Connecting ────────▶ Connected ────────────────▶ Disconnecting ──────────▶ Disconnected
//!     ▲                   │
//!     └──── detach ───────┘
//! ```
//!
//! All fields sit behind `parking_lot` locks or atomics; none of them is
//! ever held across an `.await`.

use codec::{CachedFrame, Encoding, ToClient};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use types::{now_ms, ConnectionId, ConnectionToken, PersistedConnection, Timestamp};

use crate::driver::ConnectionDriver;
use crate::error::{ActorError, Result};

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No transport attached (before the handshake, or after the link dropped)
    Connecting,
    Connected,
    /// `on_disconnect` is running
    Disconnecting,
    Disconnected,
}

pub struct Connection {
    id: ConnectionId,
    token: ConnectionToken,
    params: Value,
    auth_data: Value,
    state: Mutex<Value>,
    encoding: Mutex<Encoding>,
    driver: Mutex<Option<Arc<dyn ConnectionDriver>>>,
    subscriptions: Mutex<HashSet<String>>,
    status: Mutex<ConnectionStatus>,
    last_seen: AtomicI64,
    disconnecting: AtomicBool,
    violations: AtomicU32,
}

impl Connection {
    /// New connection with fresh credentials, not yet attached
    pub fn new(params: Value, auth_data: Value, state: Value, encoding: Encoding) -> Self {
        Self {
            id: ConnectionId::generate(),
            token: ConnectionToken::generate(),
            params,
            auth_data,
            state: Mutex::new(state),
            encoding: Mutex::new(encoding),
            driver: Mutex::new(None),
            subscriptions: Mutex::new(HashSet::new()),
            status: Mutex::new(ConnectionStatus::Connecting),
            last_seen: AtomicI64::new(now_ms()),
            disconnecting: AtomicBool::new(false),
            violations: AtomicU32::new(0),
        }
    }

    /// Rebuild a connection from the persisted record
    ///
    /// The liveness window restarts now so the client gets a full timeout
    /// to reconnect.
    pub fn restore(persisted: PersistedConnection) -> Self {
        Self {
            id: persisted.id,
            token: persisted.token,
            params: persisted.params,
            auth_data: persisted.auth_data,
            state: Mutex::new(persisted.state),
            encoding: Mutex::new(Encoding::default()),
            driver: Mutex::new(None),
            subscriptions: Mutex::new(persisted.subscriptions.into_iter().collect()),
            status: Mutex::new(ConnectionStatus::Connecting),
            last_seen: AtomicI64::new(now_ms()),
            disconnecting: AtomicBool::new(false),
            violations: AtomicU32::new(0),
        }
    }

    pub fn to_persisted(&self) -> PersistedConnection {
        let mut subscriptions: Vec<String> = self.subscriptions.lock().iter().cloned().collect();
        subscriptions.sort();
        PersistedConnection {
            id: self.id.clone(),
            token: self.token.clone(),
            params: self.params.clone(),
            auth_data: self.auth_data.clone(),
            state: self.state.lock().clone(),
            subscriptions,
            last_seen: self.last_seen(),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn token(&self) -> &ConnectionToken {
        &self.token
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    /// Value returned by `on_auth` for this connection
    pub fn auth_data(&self) -> &Value {
        &self.auth_data
    }

    pub fn state(&self) -> Value {
        self.state.lock().clone()
    }

    pub fn set_state(&self, state: Value) {
        *self.state.lock() = state;
    }

    pub fn encoding(&self) -> Encoding {
        *self.encoding.lock()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn last_seen(&self) -> Timestamp {
        self.last_seen.load(Ordering::Relaxed)
    }

    /// Record inbound traffic or a heartbeat
    pub fn touch(&self) {
        self.last_seen.store(now_ms(), Ordering::Relaxed);
    }

    /// Whether the connection has been silent for longer than `timeout_ms`
    pub fn is_stale(&self, now: Timestamp, timeout_ms: u64) -> bool {
        now.saturating_sub(self.last_seen()) > timeout_ms as i64
    }

    pub fn is_subscribed(&self, event_name: &str) -> bool {
        self.subscriptions.lock().contains(event_name)
    }

    /// Returns whether the subscription set changed
    pub fn set_subscription(&self, event_name: &str, subscribe: bool) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        if subscribe {
            subscriptions.insert(event_name.to_string())
        } else {
            subscriptions.remove(event_name)
        }
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().iter().cloned().collect()
    }

    /// Attach a transport, moving to `Connected`
    pub fn attach(&self, driver: Arc<dyn ConnectionDriver>, encoding: Encoding) {
        *self.driver.lock() = Some(driver);
        *self.encoding.lock() = encoding;
        let mut status = self.status.lock();
        if *status == ConnectionStatus::Connecting {
            *status = ConnectionStatus::Connected;
        }
        drop(status);
        self.violations.store(0, Ordering::Relaxed);
        self.touch();
    }

    /// Forget the transport after the link dropped
    pub fn detach(&self) {
        *self.driver.lock() = None;
        let mut status = self.status.lock();
        if *status == ConnectionStatus::Connected {
            *status = ConnectionStatus::Connecting;
        }
    }

    /// Encode and send a message in this connection's encoding
    pub fn send(&self, message: &ToClient) -> Result<()> {
        let frame = self.encoding().encode(message)?;
        self.send_frame(frame)
    }

    /// Send a message shared with other connections
    pub fn send_cached(&self, message: &CachedFrame) -> Result<()> {
        let frame = message.frame(self.encoding())?;
        self.send_frame(frame)
    }

    fn send_frame(&self, frame: codec::Frame) -> Result<()> {
        let driver = self.driver.lock().clone();
        match driver {
            Some(driver) => driver.send(&self.id, frame),
            None => Err(ActorError::ConnectionNotFound {
                conn_id: self.id.to_string(),
            }),
        }
    }

    /// Close the transport, if any, leaving the connection record alone
    pub async fn close_transport(&self, reason: Option<String>) {
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            debug!(conn_id = %self.id, reason = ?reason, "Closing connection transport");
            driver.close(&self.id, reason).await;
        }
    }

    /// Claim the teardown; only the first caller gets `true`
    pub fn begin_disconnect(&self) -> bool {
        if self
            .disconnecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        *self.status.lock() = ConnectionStatus::Disconnecting;
        true
    }

    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting.load(Ordering::Acquire)
    }

    pub fn mark_disconnected(&self) {
        *self.status.lock() = ConnectionStatus::Disconnected;
    }

    /// Count a malformed frame, returning the running total
    pub fn record_violation(&self) -> u32 {
        let count = self.violations.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(conn_id = %self.id, violations = count, "Protocol violation");
        count
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("last_seen", &self.last_seen())
            .finish_non_exhaustive()
    }
}
