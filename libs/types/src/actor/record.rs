//! # Persisted Actor Record
//!
//! The durable image of one actor. The actor instance is its only writer and
//! writes it through the persistence port on every state-changing operation.
//!
//! ```text
//! PersistedActor
//! ├── input             creation payload, immutable
//! ├── has_initialized   one-time initialization done
//! ├── state             opaque application state (JSON value)
//! ├── connections[]     reconnectable connection credentials + subscriptions
//! └── scheduled_events  alarm queue sorted by timestamp
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::actor::key::ActorQuery;
use crate::common::clock::Timestamp;
use crate::common::identifiers::{ConnectionId, ConnectionToken};

/// Durable record of one actor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedActor {
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub has_initialized: bool,
    #[serde(default)]
    pub state: Value,
    #[serde(default)]
    pub connections: Vec<PersistedConnection>,
    #[serde(default)]
    pub scheduled_events: Vec<ScheduledEvent>,
}

impl PersistedActor {
    /// Fresh, uninitialized record for a newly created actor
    pub fn new(input: Option<Value>) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    /// Insert an alarm keeping the queue sorted by timestamp
    ///
    /// Events with equal timestamps keep insertion order.
    pub fn insert_event(&mut self, event: ScheduledEvent) {
        let idx = self
            .scheduled_events
            .partition_point(|existing| existing.timestamp <= event.timestamp);
        self.scheduled_events.insert(idx, event);
    }

    /// Remove and return every alarm due at or before `now`, earliest first
    pub fn take_due_events(&mut self, now: Timestamp) -> Vec<ScheduledEvent> {
        let due = self
            .scheduled_events
            .partition_point(|event| event.timestamp <= now);
        self.scheduled_events.drain(..due).collect()
    }

    /// Earliest pending wake-up
    pub fn next_alarm(&self) -> Option<Timestamp> {
        self.scheduled_events.first().map(|event| event.timestamp)
    }
}

/// Reconnection credentials and subscriptions of one connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedConnection {
    pub id: ConnectionId,
    pub token: ConnectionToken,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub auth_data: Value,
    #[serde(default)]
    pub state: Value,
    #[serde(default)]
    pub subscriptions: Vec<String>,
    pub last_seen: Timestamp,
}

/// One-shot durable timer that re-enters the actor through a named action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEvent {
    pub event_id: String,
    pub timestamp: Timestamp,
    pub function_name: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl ScheduledEvent {
    pub fn new(timestamp: Timestamp, function_name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp,
            function_name: function_name.into(),
            args,
        }
    }
}

/// Identity and creation input stored alongside the record
///
/// Lets a node that never saw the original `create` call start the actor
/// after it wins the lease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorMetadata {
    pub name: String,
    #[serde(default)]
    pub key: Vec<String>,
    #[serde(default)]
    pub input: Option<Value>,
    pub created_at: Timestamp,
}

impl ActorMetadata {
    pub fn query(&self) -> ActorQuery {
        ActorQuery {
            name: self.name.clone(),
            key: self.key.clone(),
        }
    }
}
