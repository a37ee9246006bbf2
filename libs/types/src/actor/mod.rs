//! Actor identity and the durable record owned by an actor instance.

pub mod key;
pub mod record;
