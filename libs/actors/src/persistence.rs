//! Persistence Port
//!
//! Durable storage of actor records. The actor instance is the only writer
//! of its record; the coordinate layer guarantees at most one live instance
//! per actor id across nodes.
//!
//! [`MemoryPersistence`] keeps everything in process and is shared between
//! simulated nodes in tests, which makes failover observable without an
//! external store.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;
use types::{ActorId, ActorMetadata, PersistedActor, Timestamp};

use crate::error::{ActorError, Result};

/// Storage backend for actor records
#[async_trait]
pub trait PersistenceDriver: Send + Sync + 'static {
    /// Load the record, `None` for an actor that never persisted
    async fn read(&self, actor_id: &ActorId) -> Result<Option<PersistedActor>>;

    /// Replace the record
    async fn write(&self, actor_id: &ActorId, record: &PersistedActor) -> Result<()>;

    /// Register the earliest pending wake-up, `None` clears it
    async fn set_alarm(&self, actor_id: &ActorId, timestamp: Option<Timestamp>) -> Result<()>;

    async fn read_metadata(&self, actor_id: &ActorId) -> Result<Option<ActorMetadata>>;

    /// Store metadata unless some already exists; returns whether it was stored
    async fn create_metadata(&self, actor_id: &ActorId, metadata: &ActorMetadata) -> Result<bool>;
}

/// In-process persistence backed by concurrent maps
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    records: DashMap<ActorId, PersistedActor>,
    metadata: DashMap<ActorId, ActorMetadata>,
    alarms: DashMap<ActorId, Timestamp>,
    writes: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored record
    pub fn record(&self, actor_id: &ActorId) -> Option<PersistedActor> {
        self.records.get(actor_id).map(|entry| entry.value().clone())
    }

    /// Registered wake-up time
    pub fn alarm(&self, actor_id: &ActorId) -> Option<Timestamp> {
        self.alarms.get(actor_id).map(|entry| *entry.value())
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Make subsequent writes fail until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl PersistenceDriver for MemoryPersistence {
    async fn read(&self, actor_id: &ActorId) -> Result<Option<PersistedActor>> {
        Ok(self.record(actor_id))
    }

    async fn write(&self, actor_id: &ActorId, record: &PersistedActor) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(ActorError::persistence(format!(
                "write rejected for actor {actor_id}"
            )));
        }
        self.records.insert(actor_id.clone(), record.clone());
        let total = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(actor_id = %actor_id, writes = total, "Record persisted");
        Ok(())
    }

    async fn set_alarm(&self, actor_id: &ActorId, timestamp: Option<Timestamp>) -> Result<()> {
        match timestamp {
            Some(ts) => {
                self.alarms.insert(actor_id.clone(), ts);
            }
            None => {
                self.alarms.remove(actor_id);
            }
        }
        Ok(())
    }

    async fn read_metadata(&self, actor_id: &ActorId) -> Result<Option<ActorMetadata>> {
        Ok(self.metadata.get(actor_id).map(|entry| entry.value().clone()))
    }

    async fn create_metadata(&self, actor_id: &ActorId, metadata: &ActorMetadata) -> Result<bool> {
        match self.metadata.entry(actor_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(metadata.clone());
                Ok(true)
            }
        }
    }
}
