//! # Coordinate Topology
//!
//! ## Purpose
//!
//! Runs the actor runtime on several nodes at once while keeping every actor
//! single-writer:
//! - one lease per actor in a shared [`CoordinateStore`], written with a
//!   compare-and-set on its generation
//! - the leaseholder runs the actor; every other node relays its clients'
//!   traffic to the leaseholder over the store's pub/sub channel
//! - when a lease expires any node may take it over and reloads the actor
//!   from persistence
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → libs/codec → libs/actors → [coordinate]
//!                  ↓             ↓              ↓
//!           NodeEnvelope      Manager     Leases, relay,
//!                                          failover
//! ```
//!
//! ## Lock Ordering
//!
//! 1. peer transition mutex (async, held for one lease round trip)
//! 2. manager registry and actor context locks (see `actor_runtime`)
//! 3. `dashmap` shards of links, peers and pending acks; never held across
//!    an `.await`

pub mod directory;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod node;
pub mod peer;
mod relay;
pub mod store;

pub use directory::LeaseDirectory;
pub use error::{CoordinateError, CoordinateResult};
pub use memory::MemoryCoordinateStore;
pub use metrics::{CoordinateMetrics, CoordinateMetricsSnapshot};
pub use node::CoordinateNode;
pub use peer::{ActorPeer, LeaderChanged, PeerRole};
pub use store::{CoordinateStore, LeaseOutcome, LeaseRecord};
