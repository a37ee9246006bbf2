//! Actor Behavior
//!
//! An actor type is a definition object implementing [`Actor`]: typed state,
//! a typed vars side-table, a closed table of named actions and optional
//! lifecycle hooks. Every hook has a no-op default.
//!
//! ```rust,ignore
//! fn increment<'a>(ctx: &'a mut ActorContext<Counter>, args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
//!     Box::pin(async move {
//!         let by = args.first().and_then(Value::as_i64).unwrap_or(1);
//!         ctx.state_mut().count += by;
//!         ctx.broadcast("countChanged", vec![json!(ctx.state().count)]);
//!         Ok(json!(ctx.state().count))
//!     })
//! }
//!
//! impl Actor for Counter {
//!     type State = CounterState;
//!     type Vars = ();
//!     fn actions(&self) -> ActionRegistry<Self> {
//!         ActionRegistry::new().action("increment", increment)
//!     }
//!     // ...
//! }
//! ```

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::connection::Connection;
use crate::context::ActorContext;
use crate::error::Result;

/// Action handler: runs with exclusive access to the actor context
pub type ActionFn<A> =
    for<'a> fn(&'a mut ActorContext<A>, Vec<Value>) -> BoxFuture<'a, Result<Value>>;

/// Closed mapping from action name to handler
pub struct ActionRegistry<A: Actor> {
    handlers: HashMap<String, ActionFn<A>>,
}

impl<A: Actor> ActionRegistry<A> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler; a later registration under the same name wins
    pub fn action(mut self, name: impl Into<String>, handler: ActionFn<A>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<ActionFn<A>> {
        self.handlers.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<A: Actor> Default for ActionRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Definition of an actor type
#[async_trait]
pub trait Actor: Send + Sync + Sized + 'static {
    /// Durable state, persisted as JSON
    type State: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Ephemeral per-instance side-table, rebuilt on every start
    type Vars: Send + Sync + 'static;

    fn actions(&self) -> ActionRegistry<Self>;

    /// Initial state of a brand new actor
    fn create_state(&self, input: Option<&Value>) -> Result<Self::State>;

    /// Build the vars side-table; must not touch state or I/O
    fn create_vars(&self) -> Self::Vars;

    /// Timeout override for one action, `None` uses configuration
    fn action_timeout(&self, _action: &str) -> Option<Duration> {
        None
    }

    /// Runs once in the actor's lifetime, right after `create_state`
    async fn on_create(&self, _ctx: &mut ActorContext<Self>, _input: Option<&Value>) -> Result<()> {
        Ok(())
    }

    /// Runs every time the actor is loaded, before it serves requests
    async fn on_start(&self, _ctx: &mut ActorContext<Self>) -> Result<()> {
        Ok(())
    }

    async fn on_stop(&self, _ctx: &mut ActorContext<Self>) -> Result<()> {
        Ok(())
    }

    /// Called after a state change has been persisted
    fn on_state_change(&self, _state: &Self::State) {}

    /// Authenticate connection parameters; the result is the connection's auth data
    async fn on_auth(&self, _params: &Value) -> Result<Value> {
        Ok(Value::Null)
    }

    fn create_conn_state(&self, _params: &Value) -> Result<Value> {
        Ok(Value::Null)
    }

    /// Accept or reject a new connection
    async fn on_connect(&self, _ctx: &mut ActorContext<Self>, _conn: &Arc<Connection>) -> Result<()> {
        Ok(())
    }

    async fn on_disconnect(&self, _ctx: &mut ActorContext<Self>, _conn: &Arc<Connection>) {}
}
