//! Actor Registry
//!
//! Live actor instances on this node, keyed by actor id. Concurrent first
//! references to the same actor share one start-up: the first caller runs
//! it, the others wait for the same result.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;
use types::ActorId;

use crate::error::Result;
use crate::handle::ActorHandle;

type Slot = Arc<OnceCell<Arc<dyn ActorHandle>>>;

#[derive(Default)]
pub struct ActorRegistry {
    live: DashMap<ActorId, Slot>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live instance, starting it with `start` if needed
    ///
    /// A failed start leaves no entry behind, so the next call retries.
    pub async fn get_or_start<F, Fut>(&self, actor_id: &ActorId, start: F) -> Result<Arc<dyn ActorHandle>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn ActorHandle>>>,
    {
        // Clone the slot out so no shard lock is held across the await
        let slot = self.live.entry(actor_id.clone()).or_default().clone();

        match slot.get_or_try_init(start).await {
            Ok(handle) => Ok(handle.clone()),
            Err(err) => {
                self.live
                    .remove_if(actor_id, |_, existing| Arc::ptr_eq(existing, &slot) && existing.get().is_none());
                debug!(actor_id = %actor_id, error = %err, "Actor start failed");
                Err(err)
            }
        }
    }

    pub fn get(&self, actor_id: &ActorId) -> Option<Arc<dyn ActorHandle>> {
        self.live
            .get(actor_id)
            .and_then(|slot| slot.value().get().cloned())
    }

    /// Unregister an instance; stopping it is up to the caller
    pub fn remove(&self, actor_id: &ActorId) -> Option<Arc<dyn ActorHandle>> {
        self.live
            .remove(actor_id)
            .and_then(|(_, slot)| slot.get().cloned())
    }

    pub fn actor_ids(&self) -> Vec<ActorId> {
        self.live
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.live
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
