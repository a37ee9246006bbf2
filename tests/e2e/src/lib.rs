//! End-to-End Test Framework for the actor runtime
//!
//! Runs several coordinate nodes in one process over an in-memory store and
//! validates the whole path: client handshake, relay to the leaseholder,
//! broadcasts back through followers, and failover to a new leader.

pub mod fixtures;
pub mod framework;
pub mod scenarios;

pub use fixtures::*;
pub use framework::{TestClient, TestConfig, TestFramework, TestResult, TestScenario};
pub use scenarios::*;
pub use validation::*;
