//! Manager
//!
//! Entry point of a node: maps `{name, key}` queries to actor ids, keeps the
//! registered actor definitions and starts instances on demand.
//!
//! Ownership is answered by an [`OwnerDirectory`]. A single node uses
//! [`LocalDirectory`] and owns everything; the coordinate layer installs a
//! lease-backed directory so only the leaseholder starts an actor.

use async_trait::async_trait;
use config::RuntimeConfig;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use types::{now_ms, ActorId, ActorMetadata, ActorQuery, NodeId};

use crate::behavior::Actor;
use crate::connection::Connection;
use crate::error::{ActorError, Result};
use crate::handle::{ActorHandle, ConnectRequest, StopReason};
use crate::instance::ActorInstance;
use crate::metrics::ActorMetrics;
use crate::persistence::PersistenceDriver;
use crate::registry::ActorRegistry;

/// Shared services handed to every actor instance of a manager
#[derive(Clone)]
pub struct RuntimeServices {
    pub persistence: Arc<dyn PersistenceDriver>,
    pub config: Arc<RuntimeConfig>,
    pub metrics: Arc<ActorMetrics>,
}

/// Starts instances of one registered actor type
#[async_trait]
pub trait ActorFactory: Send + Sync {
    async fn start(
        &self,
        actor_id: ActorId,
        metadata: ActorMetadata,
        services: &RuntimeServices,
    ) -> Result<Arc<dyn ActorHandle>>;
}

/// [`ActorFactory`] for an [`Actor`] definition
pub struct Definition<A: Actor> {
    actor: Arc<A>,
}

impl<A: Actor> Definition<A> {
    pub fn new(actor: A) -> Self {
        Self {
            actor: Arc::new(actor),
        }
    }
}

#[async_trait]
impl<A: Actor> ActorFactory for Definition<A> {
    async fn start(
        &self,
        actor_id: ActorId,
        metadata: ActorMetadata,
        services: &RuntimeServices,
    ) -> Result<Arc<dyn ActorHandle>> {
        let query = metadata.query();
        let instance = ActorInstance::start(
            actor_id,
            query,
            metadata.input,
            self.actor.clone(),
            services.persistence.clone(),
            services.config.clone(),
            services.metrics.clone(),
        )
        .await?;
        let handle: Arc<dyn ActorHandle> = instance;
        Ok(handle)
    }
}

/// Node that currently owns an actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerEndpoint {
    pub node_id: NodeId,
    pub is_local: bool,
}

#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn locate(&self, actor_id: &ActorId) -> Result<OwnerEndpoint>;

    /// Fetch or start the instance of an actor owned by this node
    ///
    /// Directories whose ownership can change underneath override this so the
    /// ownership check and the start happen atomically.
    async fn owned_instance(&self, manager: &Manager, actor_id: &ActorId) -> Result<Arc<dyn ActorHandle>> {
        let owner = self.locate(actor_id).await?;
        if !owner.is_local {
            return Err(ActorError::LeaseConflict {
                actor_id: actor_id.to_string(),
            });
        }
        manager.instance(actor_id).await
    }
}

/// Directory for a single node: every actor is local
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    node_id: NodeId,
}

impl LocalDirectory {
    pub fn new(node_id: NodeId) -> Self {
        Self { node_id }
    }
}

#[async_trait]
impl OwnerDirectory for LocalDirectory {
    async fn locate(&self, _actor_id: &ActorId) -> Result<OwnerEndpoint> {
        Ok(OwnerEndpoint {
            node_id: self.node_id.clone(),
            is_local: true,
        })
    }
}

pub struct Manager {
    node_id: NodeId,
    factories: HashMap<String, Arc<dyn ActorFactory>>,
    registry: ActorRegistry,
    services: RuntimeServices,
    directory: RwLock<Arc<dyn OwnerDirectory>>,
}

impl Manager {
    pub fn new(node_id: NodeId, persistence: Arc<dyn PersistenceDriver>, config: RuntimeConfig) -> Self {
        let directory: Arc<dyn OwnerDirectory> = Arc::new(LocalDirectory::new(node_id.clone()));
        Self {
            node_id,
            factories: HashMap::new(),
            registry: ActorRegistry::new(),
            services: RuntimeServices {
                persistence,
                config: Arc::new(config),
                metrics: Arc::new(ActorMetrics::default()),
            },
            directory: RwLock::new(directory),
        }
    }

    /// Register an actor type under `name`
    pub fn register<A: Actor>(self, name: impl Into<String>, actor: A) -> Self {
        self.register_factory(name, Arc::new(Definition::new(actor)))
    }

    pub fn register_factory(mut self, name: impl Into<String>, factory: Arc<dyn ActorFactory>) -> Self {
        let name = name.into();
        debug!(node_id = %self.node_id, actor = %name, "Actor type registered");
        self.factories.insert(name, factory);
        self
    }

    /// Replace the ownership directory
    pub fn set_directory(&self, directory: Arc<dyn OwnerDirectory>) {
        *self.directory.write() = directory;
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn config(&self) -> &Arc<RuntimeConfig> {
        &self.services.config
    }

    pub fn metrics(&self) -> &Arc<ActorMetrics> {
        &self.services.metrics
    }

    pub fn persistence(&self) -> &Arc<dyn PersistenceDriver> {
        &self.services.persistence
    }

    fn check_query(&self, query: &ActorQuery) -> Result<ActorId> {
        query.validate()?;
        if !self.factories.contains_key(&query.name) {
            return Err(ActorError::ActorNotFound {
                name: query.name.clone(),
                key: query.key.clone(),
            });
        }
        Ok(query.actor_id())
    }

    fn metadata(query: &ActorQuery, input: Option<Value>) -> ActorMetadata {
        ActorMetadata {
            name: query.name.clone(),
            key: query.key.clone(),
            input,
            created_at: now_ms(),
        }
    }

    /// Id of an existing actor; `ActorNotFound` if it was never created
    pub async fn get(&self, query: &ActorQuery) -> Result<ActorId> {
        let actor_id = self.check_query(query)?;
        match self.services.persistence.read_metadata(&actor_id).await? {
            Some(_) => Ok(actor_id),
            None => Err(ActorError::ActorNotFound {
                name: query.name.clone(),
                key: query.key.clone(),
            }),
        }
    }

    /// Create a new actor; `ActorAlreadyExists` if the id is taken
    pub async fn create(&self, query: &ActorQuery, input: Option<Value>) -> Result<ActorId> {
        let actor_id = self.check_query(query)?;
        let created = self
            .services
            .persistence
            .create_metadata(&actor_id, &Self::metadata(query, input))
            .await?;
        if !created {
            return Err(ActorError::ActorAlreadyExists {
                name: query.name.clone(),
                key: query.key.clone(),
            });
        }
        info!(actor_id = %actor_id, name = %query.name, key = ?query.key, "Actor created");
        Ok(actor_id)
    }

    /// Get-or-create; `input` is only used when the actor is new
    pub async fn resolve(&self, query: &ActorQuery, input: Option<Value>) -> Result<ActorId> {
        let actor_id = self.check_query(query)?;
        let created = self
            .services
            .persistence
            .create_metadata(&actor_id, &Self::metadata(query, input))
            .await?;
        if created {
            info!(actor_id = %actor_id, name = %query.name, key = ?query.key, "Actor created on first reference");
        }
        Ok(actor_id)
    }

    pub async fn locate(&self, actor_id: &ActorId) -> Result<OwnerEndpoint> {
        let directory = self.directory.read().clone();
        directory.locate(actor_id).await
    }

    /// Live instance on this node, starting it from its metadata if needed
    ///
    /// Does not consult the directory; callers must own the actor.
    pub async fn instance(&self, actor_id: &ActorId) -> Result<Arc<dyn ActorHandle>> {
        self.registry
            .get_or_start(actor_id, || async {
                let metadata = self
                    .services
                    .persistence
                    .read_metadata(actor_id)
                    .await?
                    .ok_or_else(|| ActorError::ActorNotFound {
                        name: actor_id.to_string(),
                        key: Vec::new(),
                    })?;
                let factory = self.factories.get(&metadata.name).cloned().ok_or_else(|| {
                    ActorError::ActorNotFound {
                        name: metadata.name.clone(),
                        key: metadata.key.clone(),
                    }
                })?;
                factory.start(actor_id.clone(), metadata, &self.services).await
            })
            .await
    }

    /// Already running instance, without starting one
    pub fn live_instance(&self, actor_id: &ActorId) -> Option<Arc<dyn ActorHandle>> {
        self.registry.get(actor_id)
    }

    pub fn running_actors(&self) -> Vec<ActorId> {
        self.registry.actor_ids()
    }

    /// Stop and unregister an instance; returns whether one was running
    pub async fn stop_instance(&self, actor_id: &ActorId, reason: StopReason) -> bool {
        match self.registry.remove(actor_id) {
            Some(instance) => {
                instance.stop(reason).await;
                true
            }
            None => false,
        }
    }

    /// Gracefully stop every local instance
    pub async fn shutdown(&self) {
        let actor_ids = self.registry.actor_ids();
        info!(node_id = %self.node_id, actors = actor_ids.len(), "Shutting down manager");
        for actor_id in actor_ids {
            self.stop_instance(&actor_id, StopReason::Graceful).await;
        }
    }

    /// Instance of an actor this node must own
    async fn owned_instance(&self, actor_id: &ActorId) -> Result<Arc<dyn ActorHandle>> {
        let directory = self.directory.read().clone();
        directory.owned_instance(self, actor_id).await
    }

    /// Resolve `query` and open a connection on the local instance
    pub async fn connect(&self, query: &ActorQuery, request: ConnectRequest) -> Result<Arc<Connection>> {
        let actor_id = self.resolve(query, None).await?;
        self.owned_instance(&actor_id).await?.connect(request).await
    }

    /// Resolve `query` and run an action without a caller connection
    pub async fn execute_action(&self, query: &ActorQuery, name: &str, args: Vec<Value>) -> Result<Value> {
        let actor_id = self.resolve(query, None).await?;
        self.owned_instance(&actor_id)
            .await?
            .execute_action(name, args)
            .await
    }
}
