//! Runtime defaults
//!
//! Default values for every recognized option. `RuntimeConfig::default()`
//! is built from these, so a missing key in a config file falls back here.

/// Action dispatch defaults
pub mod action {
    /// Per-action timeout (milliseconds)
    pub const TIMEOUT_MS: u64 = 60_000;
}

/// Connection lifecycle defaults
pub mod lifecycle {
    /// How often connections are checked for liveness (milliseconds)
    pub const CONNECTION_LIVENESS_INTERVAL_MS: u64 = 5_000;

    /// Silence after which a connection is evicted (milliseconds)
    pub const CONNECTION_LIVENESS_TIMEOUT_MS: u64 = 2_500;
}

/// Client protocol defaults
pub mod protocol {
    /// Largest accepted inbound frame (bytes)
    pub const MAX_INCOMING_MESSAGE_SIZE: usize = 65_536;

    /// Malformed frames tolerated before a forced disconnect
    pub const MAX_PROTOCOL_VIOLATIONS: u32 = 3;
}

/// Coordinate topology defaults
pub mod coordinate {
    /// Lease validity after acquire/renew (milliseconds)
    pub const LEASE_DURATION_MS: u64 = 3_000;

    /// Renewal happens this long before expiry (milliseconds)
    pub const RENEW_LEASE_GRACE_MS: u64 = 1_500;

    /// Follower directory re-check period (milliseconds)
    pub const CHECK_LEASE_INTERVAL_MS: u64 = 1_000;

    /// Upper bound of random jitter added to each re-check (milliseconds)
    pub const CHECK_LEASE_JITTER_MS: u64 = 500;

    /// Wait for a relay ack before giving up (milliseconds)
    pub const MESSAGE_ACK_TIMEOUT_MS: u64 = 1_000;

    /// Extra attempts for forward-open and forward-close
    pub const RELAY_RETRIES: u32 = 2;
}

/// Logging defaults
pub mod logging {
    pub const LEVEL: &str = "info";
}
