//! # Actor Runtime Shared Types
//!
//! Pure data structures shared by every layer of the actor runtime. Nothing
//! in here performs I/O; the codec, runtime and coordinate crates build on
//! these definitions.
//!
//! ## Contents
//!
//! - **Identity**: [`ActorQuery`] (`{name, key}`) and its deterministic
//!   serialization into an [`ActorId`]
//! - **Typed identifiers**: [`ActorId`], [`ConnectionId`], [`NodeId`] and the
//!   reconnection credential [`ConnectionToken`]
//! - **Persisted record**: [`PersistedActor`] and the pieces it is built from
//!   ([`PersistedConnection`], [`ScheduledEvent`], [`ActorMetadata`])
//! - **Clock**: millisecond wall clock helpers used for leases, alarms and
//!   liveness
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → libs/codec → libs/actors → libs/coordinate
//!     ↑
//! Identity, records, clock
//! ```

pub mod actor;
pub mod common;

pub use actor::key::{
    deserialize_key, serialize_key, serialize_name_and_key, ActorQuery, EMPTY_KEY_MARKER,
};
pub use actor::record::{ActorMetadata, PersistedActor, PersistedConnection, ScheduledEvent};
pub use common::clock::{now_ms, Timestamp};
pub use common::errors::IdentityError;
pub use common::identifiers::{ActorId, ConnectionId, ConnectionToken, NodeId};
