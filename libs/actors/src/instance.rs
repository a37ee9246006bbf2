//! Actor Instance
//!
//! One live actor on this node: the state machine, the serialization point
//! for actions and hooks, the connection set and the background tasks
//! (alarm timer, liveness sweep).
//!
//! ```text
//! Created ──▶ Loading ──▶ Running ──▶ Stopping ──▶ Stopped
//!               │                        ▲
//!               │ read record            │ Graceful: disconnect all, on_stop, persist
//!               │ create_state/on_create │ LeaseLost: fence writes, close transports
//!               │ on_start, persist      │
//! ```
//!
//! # Action dispatch
//!
//! Every action runs in its own task that first waits for the context mutex.
//! The action timeout covers the wait and the run. A call still queued at
//! its deadline is answered with `ActionTimeout` and never runs. A handler
//! that is already running when the deadline passes keeps the mutex,
//! finishes, persists and flushes its events; the caller has already been
//! answered with `ActionTimeout`.
//!
//! # Lock Ordering
//!
//! 1. `core` (async mutex around the [`ActorContext`])
//! 2. `status` / connection-internal `parking_lot` locks
//!
//! `parking_lot` guards are never held across an `.await`.

use async_trait::async_trait;
use codec::{Frame, ProtocolError, ToClient, ToServer, ToServerBody};
use config::RuntimeConfig;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use types::{now_ms, ActorId, ActorQuery, ConnectionId, PersistedActor, Timestamp};

use crate::behavior::{ActionFn, ActionRegistry, Actor};
use crate::connection::Connection;
use crate::context::{ActorContext, ConnectionMap};
use crate::driver::ConnectionDriver;
use crate::error::{ActorError, Result};
use crate::handle::{ActorHandle, ActorStatus, ConnectRequest, Reconnect, StopReason};
use crate::metrics::ActorMetrics;
use crate::persistence::PersistenceDriver;
use crate::schedule::{spawn_alarm_task, AlarmTimer};

const REASON_LIVENESS: &str = "liveness timeout";
const REASON_VIOLATIONS: &str = "too many protocol violations";
const REASON_STOPPED: &str = "actor stopped";
const REASON_LEASE_LOST: &str = "lease lost";

pub struct ActorInstance<A: Actor> {
    actor_id: ActorId,
    query: ActorQuery,
    def: Arc<A>,
    actions: ActionRegistry<A>,
    core: Arc<AsyncMutex<ActorContext<A>>>,
    connections: ConnectionMap,
    status: RwLock<ActorStatus>,
    fenced: Arc<AtomicBool>,
    config: Arc<RuntimeConfig>,
    metrics: Arc<ActorMetrics>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    weak_self: Weak<Self>,
}

impl<A: Actor> ActorInstance<A> {
    /// Load (or initialize) the actor and start serving
    pub async fn start(
        actor_id: ActorId,
        query: ActorQuery,
        input: Option<Value>,
        def: Arc<A>,
        persistence: Arc<dyn PersistenceDriver>,
        config: Arc<RuntimeConfig>,
        metrics: Arc<ActorMetrics>,
    ) -> Result<Arc<Self>> {
        debug!(actor_id = %actor_id, name = %query.name, status = ?ActorStatus::Loading, "Loading actor");

        let mut record = persistence
            .read(&actor_id)
            .await?
            .unwrap_or_else(|| PersistedActor::new(input));

        let state = if record.has_initialized {
            serde_json::from_value(std::mem::take(&mut record.state)).map_err(|e| {
                ActorError::internal_with_source("Failed to decode persisted state", e)
            })?
        } else {
            def.create_state(record.input.as_ref())?
        };

        let connections: ConnectionMap = Arc::new(DashMap::new());
        for persisted in std::mem::take(&mut record.connections) {
            let conn = Arc::new(Connection::restore(persisted));
            connections.insert(conn.id().clone(), conn);
        }

        let (alarm, alarm_rx) = AlarmTimer::new();
        let fenced = Arc::new(AtomicBool::new(false));
        let mut ctx = ActorContext::new(
            actor_id.clone(),
            query.clone(),
            state,
            def.create_vars(),
            record,
            connections.clone(),
            persistence,
            alarm,
            fenced.clone(),
            metrics.clone(),
        );

        if !ctx.has_initialized() {
            let input = ctx.input().cloned();
            def.on_create(&mut ctx, input.as_ref()).await?;
            ctx.mark_initialized();
        }
        def.on_start(&mut ctx).await?;
        commit(def.as_ref(), &mut ctx).await?;
        ctx.sync_alarm().await?;

        let restored = connections.len();
        let actions = def.actions();
        let instance = Arc::new_cyclic(|weak_self| Self {
            actor_id,
            query,
            def,
            actions,
            core: Arc::new(AsyncMutex::new(ctx)),
            connections,
            status: RwLock::new(ActorStatus::Running),
            fenced,
            config,
            metrics,
            tasks: Mutex::new(Vec::new()),
            weak_self: weak_self.clone(),
        });
        instance.spawn_background(alarm_rx);
        instance.metrics.record_actor_started();

        info!(
            actor_id = %instance.actor_id,
            name = %instance.query.name,
            restored_connections = restored,
            "Actor started"
        );
        Ok(instance)
    }

    fn spawn_background(self: &Arc<Self>, alarm_rx: watch::Receiver<Option<Timestamp>>) {
        let alarm = spawn_alarm_task(Arc::downgrade(self), alarm_rx, |instance: Arc<Self>| async move {
            instance.on_alarm().await;
        });

        let weak = Arc::downgrade(self);
        let interval = self.config.lifecycle.liveness_interval();
        let liveness = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(instance) = weak.upgrade() else { break };
                instance.sweep_connections().await;
            }
        });

        self.tasks.lock().extend([alarm, liveness]);
    }

    fn stopped_error(&self) -> ActorError {
        if self.fenced.load(Ordering::Acquire) {
            ActorError::LeaseConflict {
                actor_id: self.actor_id.to_string(),
            }
        } else {
            ActorError::ActorStopped {
                actor_id: self.actor_id.to_string(),
            }
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if *self.status.read() == ActorStatus::Running && !self.fenced.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(self.stopped_error())
        }
    }

    /// Wire error for `err`, logging internal failures
    fn error_frame(&self, err: &ActorError, related_action_id: Option<u64>) -> ToClient {
        if err.is_internal() {
            error!(actor_id = %self.actor_id, error = %err, "Internal error");
        }
        let wire = err.to_wire(self.config.protocol.expose_internal_errors);
        ToClient::error(wire.code, wire.message, wire.metadata, related_action_id)
    }

    /// Report a failed handshake straight to the transport and close it
    async fn reject(&self, driver: &Arc<dyn ConnectionDriver>, request: &RejectTarget, err: &ActorError) {
        let frame = self.error_frame(err, None);
        match request.encoding.encode(&frame) {
            Ok(encoded) => {
                let _ = driver.send(&request.conn_id, encoded);
            }
            Err(e) => warn!(actor_id = %self.actor_id, error = %e, "Failed to encode rejection"),
        }
        driver.close(&request.conn_id, Some(err.code().to_string())).await;
    }

    async fn commit(&self, ctx: &mut ActorContext<A>) -> Result<()> {
        commit(self.def.as_ref(), ctx).await
    }

    async fn reconnect(
        &self,
        reconnect: Reconnect,
        driver: Arc<dyn ConnectionDriver>,
        encoding: codec::Encoding,
    ) -> Result<Arc<Connection>> {
        let target = RejectTarget {
            conn_id: reconnect.connection_id.clone(),
            encoding,
        };
        let conn = match self.connection(&reconnect.connection_id) {
            Some(conn) if conn.token().verify(&reconnect.token) && !conn.is_disconnecting() => conn,
            _ => {
                self.metrics.record_unauthorized();
                warn!(
                    actor_id = %self.actor_id,
                    conn_id = %reconnect.connection_id,
                    "Reconnect rejected"
                );
                let err = ActorError::unauthorized("invalid connection credentials");
                self.reject(&driver, &target, &err).await;
                return Err(err);
            }
        };

        conn.close_transport(Some("replaced by reconnect".to_string()))
            .await;
        conn.attach(driver, encoding);
        conn.send(&ToClient::init(
            self.actor_id.as_str(),
            conn.id().as_str(),
            conn.token().expose(),
        ))?;

        self.metrics.record_connection_opened(true);
        info!(actor_id = %self.actor_id, conn_id = %conn.id(), "Connection resumed");
        Ok(conn)
    }

    /// Run an action through the serialization point, applying the timeout
    async fn run_action(
        &self,
        name: &str,
        args: Vec<Value>,
        caller: Option<Arc<Connection>>,
    ) -> Result<Value> {
        self.ensure_running()?;
        let handler = self
            .actions
            .get(name)
            .ok_or_else(|| ActorError::ActionNotFound {
                name: name.to_string(),
            })?;
        let timeout = self
            .def
            .action_timeout(name)
            .unwrap_or_else(|| self.config.action.timeout_for(name));
        let this = self.weak_self.upgrade().ok_or_else(|| self.stopped_error())?;

        let (started_tx, started_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let action = name.to_string();
        tokio::spawn(async move {
            let mut ctx = this.core.clone().lock_owned().await;
            // The caller gave up while this call was queued
            if started_tx.send(()).is_err() {
                debug!(actor_id = %this.actor_id, action = %action, "Abandoned action skipped");
                return;
            }
            let result = this.run_handler(&mut ctx, &action, handler, args, caller).await;
            let _ = done_tx.send(result);
        });

        let started = Arc::new(AtomicBool::new(false));
        let call = {
            let started = started.clone();
            async move {
                if started_rx.await.is_err() {
                    return Err(ActorError::internal(format!("Action '{name}' was dropped before starting")));
                }
                started.store(true, Ordering::Release);
                match done_rx.await {
                    Ok(result) => result,
                    Err(_) => Err(ActorError::internal(format!("Action '{name}' aborted"))),
                }
            }
        };

        // The deadline covers waiting behind earlier calls as well as running
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                self.metrics.record_action_timeout();
                let running = started.load(Ordering::Acquire);
                warn!(
                    actor_id = %self.actor_id,
                    action = %name,
                    timeout_ms = timeout.as_millis() as u64,
                    running,
                    "Action timed out"
                );
                Err(ActorError::action_timeout(name, timeout.as_millis() as u64))
            }
        }
    }

    async fn run_handler(
        &self,
        ctx: &mut ActorContext<A>,
        action: &str,
        handler: ActionFn<A>,
        args: Vec<Value>,
        caller: Option<Arc<Connection>>,
    ) -> Result<Value> {
        // Re-check after waiting for the mutex
        self.ensure_running()?;

        let started = Instant::now();
        ctx.begin_call(caller);
        let result = handler(ctx, args).await;
        let committed = self.commit(ctx).await;
        ctx.end_call();

        let result = match (result, committed) {
            (Ok(output), Ok(())) => Ok(output),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(commit_err)) => {
                warn!(actor_id = %self.actor_id, action, error = %commit_err, "Commit after failed action also failed");
                Err(e)
            }
        };

        self.metrics.record_action(started.elapsed(), result.is_ok());
        match &result {
            Ok(_) => debug!(actor_id = %self.actor_id, action, "Action completed"),
            Err(e) => debug!(actor_id = %self.actor_id, action, code = e.code(), "Action failed"),
        }
        result
    }

    async fn protocol_violation(&self, conn: &Arc<Connection>, err: ProtocolError) -> Result<()> {
        self.metrics.record_protocol_violation();
        let count = conn.record_violation();
        let _ = conn.send(&self.error_frame(&ActorError::Protocol(err), None));

        let limit = self.config.protocol.max_protocol_violations;
        if limit > 0 && count >= limit {
            warn!(actor_id = %self.actor_id, conn_id = %conn.id(), violations = count, "Closing connection after repeated protocol violations");
            self.disconnect_with(conn.id(), Some(REASON_VIOLATIONS.to_string()), false)
                .await?;
        }
        Ok(())
    }

    async fn disconnect_with(
        &self,
        conn_id: &ConnectionId,
        reason: Option<String>,
        evicted: bool,
    ) -> Result<()> {
        let conn = self
            .connection(conn_id)
            .ok_or_else(|| ActorError::ConnectionNotFound {
                conn_id: conn_id.to_string(),
            })?;
        if !conn.begin_disconnect() {
            return Ok(());
        }
        let mut ctx = self.core.lock().await;
        self.teardown_connection(&mut ctx, &conn, reason, evicted).await
    }

    /// Run `on_disconnect` and drop the connection; the caller has claimed
    /// the teardown with [`Connection::begin_disconnect`]
    async fn teardown_connection(
        &self,
        ctx: &mut ActorContext<A>,
        conn: &Arc<Connection>,
        reason: Option<String>,
        evicted: bool,
    ) -> Result<()> {
        ctx.begin_call(None);
        self.def.on_disconnect(ctx, conn).await;
        ctx.end_call();

        self.connections.remove(conn.id());
        conn.close_transport(reason.clone()).await;
        conn.mark_disconnected();
        ctx.mark_record_dirty();

        self.metrics.record_connection_closed(evicted);
        info!(
            actor_id = %self.actor_id,
            conn_id = %conn.id(),
            reason = ?reason,
            evicted,
            "Connection disconnected"
        );
        self.commit(ctx).await
    }

    async fn sweep_connections(&self) {
        let now = now_ms();
        let timeout_ms = self.config.lifecycle.connection_liveness_timeout_ms;
        let stale: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| entry.value().is_stale(now, timeout_ms))
            .map(|entry| entry.key().clone())
            .collect();

        for conn_id in stale {
            debug!(actor_id = %self.actor_id, conn_id = %conn_id, "Evicting silent connection");
            if let Err(e) = self
                .disconnect_with(&conn_id, Some(REASON_LIVENESS.to_string()), true)
                .await
            {
                warn!(actor_id = %self.actor_id, conn_id = %conn_id, error = %e, "Eviction failed");
            }
        }
    }

    /// Run every due scheduled event, then re-arm for the next one
    async fn on_alarm(&self) {
        if self.ensure_running().is_err() {
            return;
        }
        let mut ctx = self.core.lock().await;

        let due = ctx.take_due_events(now_ms());
        for event in due {
            let started = Instant::now();
            let result = match self.actions.get(&event.function_name) {
                Some(handler) => {
                    ctx.begin_call(None);
                    let result = handler(&mut *ctx, event.args).await;
                    ctx.end_call();
                    result
                }
                None => Err(ActorError::ActionNotFound {
                    name: event.function_name.clone(),
                }),
            };
            let committed = self.commit(&mut ctx).await;
            let success = result.is_ok() && committed.is_ok();
            self.metrics.record_alarm(success);

            match result.and(committed) {
                Ok(_) => debug!(
                    actor_id = %self.actor_id,
                    event_id = %event.event_id,
                    action = %event.function_name,
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "Scheduled event ran"
                ),
                Err(e) => warn!(
                    actor_id = %self.actor_id,
                    event_id = %event.event_id,
                    action = %event.function_name,
                    error = %e,
                    "Scheduled event failed"
                ),
            }
        }

        if let Err(e) = self.commit(&mut ctx).await {
            warn!(actor_id = %self.actor_id, error = %e, "Failed to persist alarm queue");
        }
        if let Err(e) = ctx.sync_alarm().await {
            warn!(actor_id = %self.actor_id, error = %e, "Failed to re-arm alarm");
        }
    }
}

/// Where to report a failed handshake
struct RejectTarget {
    conn_id: ConnectionId,
    encoding: codec::Encoding,
}

/// Persist if anything changed, then deliver queued events
///
/// Queued events are dropped when the write fails.
async fn commit<A: Actor>(def: &A, ctx: &mut ActorContext<A>) -> Result<()> {
    if ctx.is_dirty() {
        let state_changed = ctx.is_state_dirty();
        if let Err(e) = ctx.persist().await {
            ctx.discard_outbox();
            return Err(e);
        }
        if state_changed {
            def.on_state_change(ctx.state());
        }
    }
    ctx.flush_outbox();
    Ok(())
}

#[async_trait]
impl<A: Actor> ActorHandle for ActorInstance<A> {
    fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    fn query(&self) -> &ActorQuery {
        &self.query
    }

    fn status(&self) -> ActorStatus {
        *self.status.read()
    }

    async fn connect(&self, request: ConnectRequest) -> Result<Arc<Connection>> {
        let ConnectRequest {
            params,
            encoding,
            driver,
            reconnect,
        } = request;

        if let Err(err) = self.ensure_running() {
            let target = RejectTarget {
                conn_id: ConnectionId::generate(),
                encoding,
            };
            self.reject(&driver, &target, &err).await;
            return Err(err);
        }
        if let Some(reconnect) = reconnect {
            return self.reconnect(reconnect, driver, encoding).await;
        }

        let target = RejectTarget {
            conn_id: ConnectionId::generate(),
            encoding,
        };
        let auth_data = match self.def.on_auth(&params).await {
            Ok(auth_data) => auth_data,
            Err(err) => {
                self.metrics.record_unauthorized();
                let err = match err {
                    ActorError::Unauthorized { .. } => err,
                    other => ActorError::unauthorized(other.to_string()),
                };
                warn!(actor_id = %self.actor_id, error = %err, "Connection failed authentication");
                self.reject(&driver, &target, &err).await;
                return Err(err);
            }
        };
        let conn_state = match self.def.create_conn_state(&params) {
            Ok(state) => state,
            Err(err) => {
                self.reject(&driver, &target, &err).await;
                return Err(err);
            }
        };

        let conn = Arc::new(Connection::new(params, auth_data, conn_state, encoding));
        let mut ctx = self.core.lock().await;
        if let Err(err) = self.ensure_running() {
            self.reject(&driver, &target, &err).await;
            return Err(err);
        }

        ctx.begin_call(Some(conn.clone()));
        if let Err(err) = self.def.on_connect(&mut ctx, &conn).await {
            ctx.end_call();
            ctx.discard_outbox();
            self.metrics.record_connection_rejected();
            let err = match err {
                ActorError::User { message, .. } => ActorError::ConnectionRejected { reason: message },
                other => other,
            };
            info!(actor_id = %self.actor_id, error = %err, "Connection rejected by on_connect");
            self.reject(&driver, &target, &err).await;
            return Err(err);
        }

        conn.attach(driver.clone(), encoding);
        self.connections.insert(conn.id().clone(), conn.clone());
        ctx.mark_record_dirty();

        let state_changed = ctx.is_state_dirty();
        if let Err(err) = ctx.persist().await {
            ctx.end_call();
            ctx.discard_outbox();
            self.connections.remove(conn.id());
            conn.detach();
            self.reject(&driver, &target, &err).await;
            return Err(err);
        }
        if state_changed {
            self.def.on_state_change(ctx.state());
        }

        // Init is always the first frame the client sees
        conn.send(&ToClient::init(
            self.actor_id.as_str(),
            conn.id().as_str(),
            conn.token().expose(),
        ))?;
        ctx.flush_outbox();
        ctx.end_call();

        self.metrics.record_connection_opened(false);
        info!(actor_id = %self.actor_id, conn_id = %conn.id(), encoding = %encoding, "Connection opened");
        Ok(conn)
    }

    async fn process_message(&self, conn_id: &ConnectionId, frame: Frame) -> Result<()> {
        let conn = self
            .connection(conn_id)
            .ok_or_else(|| ActorError::ConnectionNotFound {
                conn_id: conn_id.to_string(),
            })?;
        conn.touch();

        let max_size = self.config.protocol.max_incoming_message_size;
        let message: ToServer = match conn.encoding().decode(&frame, max_size) {
            Ok(message) => message,
            Err(err) => return self.protocol_violation(&conn, err).await,
        };

        match message.body {
            ToServerBody::ActionRequest(request) => {
                let reply = match self
                    .run_action(&request.name, request.args, Some(conn.clone()))
                    .await
                {
                    Ok(output) => ToClient::action_response(request.id, output),
                    Err(err) => self.error_frame(&err, Some(request.id)),
                };
                if let Err(e) = conn.send(&reply) {
                    debug!(conn_id = %conn_id, error = %e, "Response dropped");
                }
            }
            ToServerBody::SubscriptionRequest(request) => {
                let changed = conn.set_subscription(&request.event_name, request.subscribe);
                debug!(
                    conn_id = %conn_id,
                    event = %request.event_name,
                    subscribe = request.subscribe,
                    changed,
                    "Subscription updated"
                );
                if changed {
                    let mut ctx = self.core.lock().await;
                    ctx.mark_record_dirty();
                    if let Err(e) = self.commit(&mut ctx).await {
                        warn!(actor_id = %self.actor_id, error = %e, "Failed to persist subscription");
                    }
                }
            }
        }
        Ok(())
    }

    async fn execute_action(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        self.run_action(name, args, None).await
    }

    fn touch(&self, conn_id: &ConnectionId) -> bool {
        match self.connection(conn_id) {
            Some(conn) => {
                conn.touch();
                true
            }
            None => false,
        }
    }

    fn transport_closed(&self, conn_id: &ConnectionId) {
        if let Some(conn) = self.connection(conn_id) {
            conn.detach();
            debug!(actor_id = %self.actor_id, conn_id = %conn_id, "Transport dropped, awaiting reconnect");
        }
    }

    async fn disconnect(&self, conn_id: &ConnectionId, reason: Option<String>) -> Result<()> {
        self.disconnect_with(conn_id, reason, false).await
    }

    async fn stop(&self, reason: StopReason) {
        {
            let mut status = self.status.write();
            if matches!(*status, ActorStatus::Stopping | ActorStatus::Stopped) {
                return;
            }
            *status = ActorStatus::Stopping;
        }
        if reason == StopReason::LeaseLost {
            self.fenced.store(true, Ordering::Release);
        }
        info!(actor_id = %self.actor_id, reason = ?reason, "Stopping actor");

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        let conns: Vec<Arc<Connection>> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        match reason {
            StopReason::Graceful => {
                let mut ctx = self.core.lock().await;
                for conn in conns {
                    if !conn.begin_disconnect() {
                        continue;
                    }
                    if let Err(e) = self
                        .teardown_connection(&mut ctx, &conn, Some(REASON_STOPPED.to_string()), false)
                        .await
                    {
                        warn!(actor_id = %self.actor_id, conn_id = %conn.id(), error = %e, "Disconnect during stop failed");
                    }
                }

                ctx.begin_call(None);
                if let Err(e) = self.def.on_stop(&mut ctx).await {
                    warn!(actor_id = %self.actor_id, error = %e, "on_stop failed");
                }
                ctx.end_call();
                ctx.mark_record_dirty();
                if let Err(e) = self.commit(&mut ctx).await {
                    error!(actor_id = %self.actor_id, error = %e, "Final persist failed");
                }
            }
            StopReason::LeaseLost => {
                // The new leaseholder restores these as reconnectable
                for conn in conns {
                    conn.close_transport(Some(REASON_LEASE_LOST.to_string()))
                        .await;
                }
                self.connections.clear();
            }
        }

        *self.status.write() = ActorStatus::Stopped;
        self.metrics.record_actor_stopped();
        info!(actor_id = %self.actor_id, reason = ?reason, "Actor stopped");
    }

    fn connection(&self, conn_id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections
            .get(conn_id)
            .map(|entry| entry.value().clone())
    }

    fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl<A: Actor> Drop for ActorInstance<A> {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
