//! Lease-backed [`OwnerDirectory`]
//!
//! Installed into the [`Manager`](actor_runtime::Manager) by
//! [`CoordinateNode::start`](crate::CoordinateNode::start), so the manager's
//! own `connect` and `execute_action` only run actors this node holds the
//! lease for.

use actor_runtime::{ActorHandle, Manager, OwnerDirectory, OwnerEndpoint, Result as ActorResult};
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use types::ActorId;

use crate::error::CoordinateError;
use crate::node::NodeInner;

pub struct LeaseDirectory {
    node: Weak<NodeInner>,
}

impl LeaseDirectory {
    pub(crate) fn new(node: Weak<NodeInner>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl OwnerDirectory for LeaseDirectory {
    async fn locate(&self, actor_id: &ActorId) -> ActorResult<OwnerEndpoint> {
        let node = self.node.upgrade().ok_or(CoordinateError::Shutdown)?;
        node.locate(actor_id).await
    }

    async fn owned_instance(&self, _manager: &Manager, actor_id: &ActorId) -> ActorResult<Arc<dyn ActorHandle>> {
        let node = self.node.upgrade().ok_or(CoordinateError::Shutdown)?;
        node.owned_instance(actor_id).await
    }
}
