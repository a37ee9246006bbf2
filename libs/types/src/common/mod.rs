//! Identifier, error and clock primitives shared across the runtime.

pub mod clock;
pub mod errors;
pub mod identifiers;
