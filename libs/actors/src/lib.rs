//! Stateful Actor Runtime
//!
//! Durable, addressable actors with typed state, named actions, realtime
//! connections and scheduled events. Each actor is a logical single thread:
//! actions and hooks of one actor never interleave, different actors run in
//! parallel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐      ┌────────────────────────────────────────┐
//! │      Transports      │      │              ActorInstance             │
//! │                      │      │                                        │
//! │  websocket / relay   │      │  ┌──────────────┐   ┌───────────────┐  │
//! │  ConnectionDriver ◀──┼──────┼──│ Connections  │   │ ActorContext  │  │
//! │          │           │      │  │ lastSeen     │   │ state, vars   │  │
//! │          ▼           │      │  └──────────────┘   │ alarm queue   │  │
//! │   process_message ───┼──────┼──▶ dispatch ───────▶│ (async mutex) │  │
//! └──────────────────────┘      │                     └──────┬────────┘  │
//!                               │                            ▼           │
//!          Manager ─────────────┼──▶ registry      PersistenceDriver     │
//!  resolve / get / create       └────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use actor_runtime::{ChannelDriver, ConnectRequest, Manager, MemoryPersistence};
//!
//! let manager = Manager::new(NodeId::generate(), Arc::new(MemoryPersistence::new()), RuntimeConfig::default())
//!     .register("counter", Counter);
//! let (driver, mut frames) = ChannelDriver::new();
//! let conn = manager
//!     .connect(&ActorQuery::singleton("counter"), ConnectRequest::new(json!({}), Encoding::Json, driver))
//!     .await?;
//! ```
//!
//! # Lock Ordering
//!
//! 1. actor context mutex (async, held for a whole action)
//! 2. registry / connection map shards (`dashmap`)
//! 3. per-connection and status `parking_lot` locks
//!
//! Only the context mutex is ever held across an `.await`.

pub mod behavior;
pub mod connection;
pub mod context;
pub mod driver;
pub mod error;
pub mod handle;
pub mod instance;
pub mod manager;
pub mod metrics;
pub mod persistence;
pub mod registry;
pub mod schedule;

pub use behavior::{ActionFn, ActionRegistry, Actor};
pub use connection::{Connection, ConnectionStatus};
pub use context::{ActorContext, ConnectionMap};
pub use driver::{ChannelDriver, ConnectionDriver, DriverEvent};
pub use error::{ActorError, Result, WireError, INTERNAL_ERROR_MESSAGE, USER_ERROR_CODE};
pub use handle::{ActorHandle, ActorStatus, ConnectRequest, Reconnect, StopReason};
pub use instance::ActorInstance;
pub use manager::{
    ActorFactory, Definition, LocalDirectory, Manager, OwnerDirectory, OwnerEndpoint,
    RuntimeServices,
};
pub use metrics::{ActorMetrics, ActorMetricsSnapshot};
pub use persistence::{MemoryPersistence, PersistenceDriver};
pub use registry::ActorRegistry;
pub use schedule::AlarmTimer;

// Re-exported so actor definitions only need this crate
pub use futures::future::BoxFuture;
