//! Envelope definitions: client traffic and node relay traffic.

pub mod client;
pub mod node;
