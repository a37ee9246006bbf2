//! Action context
//!
//! The exclusive view of one actor handed to handlers and hooks. Holding a
//! `&mut ActorContext` is the serialization point: the instance keeps the
//! context behind a single async mutex, so at most one handler of an actor
//! runs at a time.
//!
//! Events emitted through [`ActorContext::broadcast`],
//! [`ActorContext::broadcast_all`] and [`ActorContext::send_to_caller`] are
//! queued and delivered only after the surrounding operation has persisted,
//! so clients never observe state that was not committed.

use codec::{CachedFrame, ToClient};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use types::common::clock::add_duration;
use types::{now_ms, ActorId, ActorQuery, ConnectionId, PersistedActor, ScheduledEvent, Timestamp};

use crate::behavior::Actor;
use crate::connection::Connection;
use crate::error::{ActorError, Result};
use crate::metrics::ActorMetrics;
use crate::persistence::PersistenceDriver;
use crate::schedule::AlarmTimer;

/// Live connections of one actor, shared between the instance and its context
pub type ConnectionMap = Arc<DashMap<ConnectionId, Arc<Connection>>>;

enum Outgoing {
    /// `scoped`: only connections subscribed to `name`
    Broadcast { name: String, args: Vec<Value>, scoped: bool },
    Direct { conn: Arc<Connection>, name: String, args: Vec<Value> },
}

pub struct ActorContext<A: Actor> {
    actor_id: ActorId,
    query: ActorQuery,
    state: A::State,
    vars: A::Vars,
    /// Input, init flag and alarm queue; state and connections are filled in at persist time
    record: PersistedActor,
    state_dirty: bool,
    record_dirty: bool,
    caller: Option<Arc<Connection>>,
    outbox: Vec<Outgoing>,
    connections: ConnectionMap,
    persistence: Arc<dyn PersistenceDriver>,
    alarm: AlarmTimer,
    fenced: Arc<AtomicBool>,
    metrics: Arc<ActorMetrics>,
}

impl<A: Actor> ActorContext<A> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        actor_id: ActorId,
        query: ActorQuery,
        state: A::State,
        vars: A::Vars,
        record: PersistedActor,
        connections: ConnectionMap,
        persistence: Arc<dyn PersistenceDriver>,
        alarm: AlarmTimer,
        fenced: Arc<AtomicBool>,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        Self {
            actor_id,
            query,
            state,
            vars,
            record,
            state_dirty: false,
            record_dirty: false,
            caller: None,
            outbox: Vec::new(),
            connections,
            persistence,
            alarm,
            fenced,
            metrics,
        }
    }

    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    pub fn query(&self) -> &ActorQuery {
        &self.query
    }

    /// Input given when the actor was created
    pub fn input(&self) -> Option<&Value> {
        self.record.input.as_ref()
    }

    pub fn state(&self) -> &A::State {
        &self.state
    }

    /// Mutable state; the operation will persist before it is acknowledged
    pub fn state_mut(&mut self) -> &mut A::State {
        self.state_dirty = true;
        &mut self.state
    }

    pub fn vars(&self) -> &A::Vars {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut A::Vars {
        &mut self.vars
    }

    /// Connection that issued the running action, `None` for alarms and
    /// server-side calls
    pub fn caller(&self) -> Option<&Arc<Connection>> {
        self.caller.as_ref()
    }

    /// Connections currently attached to a transport
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .filter(|entry| entry.value().is_connected())
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Queue an event for every connected subscriber of `name`
    pub fn broadcast(&mut self, name: impl Into<String>, args: Vec<Value>) {
        self.outbox.push(Outgoing::Broadcast {
            name: name.into(),
            args,
            scoped: true,
        });
    }

    /// Queue an event for every connected connection, subscribed or not
    pub fn broadcast_all(&mut self, name: impl Into<String>, args: Vec<Value>) {
        self.outbox.push(Outgoing::Broadcast {
            name: name.into(),
            args,
            scoped: false,
        });
    }

    /// Queue an event for the calling connection only
    ///
    /// Returns `false` when there is no caller.
    pub fn send_to_caller(&mut self, name: impl Into<String>, args: Vec<Value>) -> bool {
        let Some(conn) = self.caller.clone() else {
            return false;
        };
        self.outbox.push(Outgoing::Direct {
            conn,
            name: name.into(),
            args,
        });
        true
    }

    /// Schedule `action` to run after `delay`; returns the event id
    pub async fn schedule_after(
        &mut self,
        delay: Duration,
        action: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<String> {
        self.schedule_at(add_duration(now_ms(), delay), action, args)
            .await
    }

    /// Schedule `action` to run at `timestamp`; returns the event id
    pub async fn schedule_at(
        &mut self,
        timestamp: Timestamp,
        action: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<String> {
        let event = ScheduledEvent::new(timestamp, action, args);
        let event_id = event.event_id.clone();
        debug!(
            actor_id = %self.actor_id,
            event_id = %event_id,
            action = %event.function_name,
            timestamp,
            "Event scheduled"
        );
        self.record.insert_event(event);
        self.record_dirty = true;
        self.sync_alarm().await?;
        Ok(event_id)
    }

    /// Drop a pending event; returns whether it existed
    pub async fn cancel_event(&mut self, event_id: &str) -> Result<bool> {
        let before = self.record.scheduled_events.len();
        self.record
            .scheduled_events
            .retain(|event| event.event_id != event_id);
        if self.record.scheduled_events.len() == before {
            return Ok(false);
        }
        self.record_dirty = true;
        self.sync_alarm().await?;
        Ok(true)
    }

    pub fn scheduled_events(&self) -> &[ScheduledEvent] {
        &self.record.scheduled_events
    }

    /// Persist immediately instead of at the end of the operation
    pub async fn save(&mut self) -> Result<()> {
        self.persist().await
    }

    pub(crate) fn has_initialized(&self) -> bool {
        self.record.has_initialized
    }

    pub(crate) fn mark_initialized(&mut self) {
        self.record.has_initialized = true;
        self.record_dirty = true;
    }

    pub(crate) fn mark_record_dirty(&mut self) {
        self.record_dirty = true;
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.state_dirty || self.record_dirty
    }

    pub(crate) fn is_state_dirty(&self) -> bool {
        self.state_dirty
    }

    pub(crate) fn begin_call(&mut self, caller: Option<Arc<Connection>>) {
        self.caller = caller;
    }

    pub(crate) fn end_call(&mut self) {
        self.caller = None;
    }

    pub(crate) fn take_due_events(&mut self, now: Timestamp) -> Vec<ScheduledEvent> {
        let due = self.record.take_due_events(now);
        if !due.is_empty() {
            self.record_dirty = true;
        }
        due
    }

    /// Point the persistence port and the local timer at the earliest event
    pub(crate) async fn sync_alarm(&self) -> Result<()> {
        let next = self.record.next_alarm();
        self.persistence.set_alarm(&self.actor_id, next).await?;
        self.alarm.arm(next);
        Ok(())
    }

    /// Write the full record through the persistence port
    ///
    /// Fails with `LeaseConflict` once the instance has been fenced.
    pub(crate) async fn persist(&mut self) -> Result<()> {
        if self.fenced.load(Ordering::Acquire) {
            return Err(ActorError::LeaseConflict {
                actor_id: self.actor_id.to_string(),
            });
        }

        let mut record = self.record.clone();
        record.state = serde_json::to_value(&self.state)?;
        record.connections = self
            .connections
            .iter()
            .filter(|entry| !entry.value().is_disconnecting())
            .map(|entry| entry.value().to_persisted())
            .collect();

        self.persistence.write(&self.actor_id, &record).await?;
        self.metrics.record_persistence_write();
        self.state_dirty = false;
        self.record_dirty = false;
        Ok(())
    }

    /// Deliver queued events; per-connection failures are swallowed
    pub(crate) fn flush_outbox(&mut self) {
        for outgoing in self.outbox.drain(..) {
            match outgoing {
                Outgoing::Broadcast { name, args, scoped } => {
                    let frame = CachedFrame::new(ToClient::event(name.as_str(), args));
                    for entry in self.connections.iter() {
                        let conn = entry.value();
                        if !conn.is_connected() || (scoped && !conn.is_subscribed(&name)) {
                            continue;
                        }
                        if let Err(e) = conn.send_cached(&frame) {
                            debug!(conn_id = %conn.id(), event = %name, error = %e, "Broadcast delivery failed");
                        }
                    }
                    self.metrics.record_broadcast();
                }
                Outgoing::Direct { conn, name, args } => {
                    if let Err(e) = conn.send(&ToClient::event(name.as_str(), args)) {
                        debug!(conn_id = %conn.id(), event = %name, error = %e, "Event delivery failed");
                    }
                }
            }
        }
    }

    /// Forget queued events
    pub(crate) fn discard_outbox(&mut self) {
        self.outbox.clear();
    }
}
