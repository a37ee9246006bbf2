//! End-to-end test scenarios

pub mod contacts_sync;
pub mod counter_relay;
pub mod leader_failover;

pub use contacts_sync::ContactsSyncTest;
pub use counter_relay::CounterRelayTest;
pub use leader_failover::LeaderFailoverTest;
