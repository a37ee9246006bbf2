//! Wall clock helpers.
//!
//! Leases, alarms and liveness all compare millisecond UNIX timestamps. The
//! coordinate store and the actor instance must agree on the clock, so every
//! caller goes through [`now_ms`].

use chrono::Utc;
use std::time::Duration;

/// Milliseconds since the UNIX epoch
pub type Timestamp = i64;

/// Current wall clock time in milliseconds
#[inline]
pub fn now_ms() -> Timestamp {
    Utc::now().timestamp_millis()
}

/// Add a duration to a timestamp, saturating instead of overflowing
#[inline]
pub fn add_duration(ts: Timestamp, duration: Duration) -> Timestamp {
    ts.saturating_add(duration.as_millis().min(i64::MAX as u128) as i64)
}

/// Duration remaining until `deadline`, zero when it already passed
#[inline]
pub fn until(deadline: Timestamp) -> Duration {
    let remaining = deadline.saturating_sub(now_ms());
    Duration::from_millis(remaining.max(0) as u64)
}
