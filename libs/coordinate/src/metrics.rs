//! Lease and relay counters for one coordinate node.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CoordinateMetrics {
    // Lease transitions
    pub leases_acquired: AtomicU64,
    pub leases_renewed: AtomicU64,
    pub leases_lost: AtomicU64,
    pub leases_released: AtomicU64,
    pub lease_errors: AtomicU64,

    // Relay traffic
    pub relay_forwards: AtomicU64,
    pub relay_retries: AtomicU64,
    pub relay_timeouts: AtomicU64,
    pub relay_rejections: AtomicU64,
    pub frames_to_followers: AtomicU64,
    pub relays_closed_on_leader_change: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinateMetricsSnapshot {
    pub leases_acquired: u64,
    pub leases_renewed: u64,
    pub leases_lost: u64,
    pub leases_released: u64,
    pub lease_errors: u64,
    pub relay_forwards: u64,
    pub relay_retries: u64,
    pub relay_timeouts: u64,
    pub relay_rejections: u64,
    pub frames_to_followers: u64,
    pub relays_closed_on_leader_change: u64,
}

impl CoordinateMetrics {
    pub fn record_lease_acquired(&self) {
        self.leases_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lease_renewed(&self) {
        self.leases_renewed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lease_lost(&self) {
        self.leases_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lease_released(&self) {
        self.leases_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lease_error(&self) {
        self.lease_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// One forward attempt; retries are counted separately
    pub fn record_forward(&self, attempt: u32) {
        self.relay_forwards.fetch_add(1, Ordering::Relaxed);
        if attempt > 0 {
            self.relay_retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_relay_timeout(&self) {
        self.relay_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relay_rejection(&self) {
        self.relay_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_to_follower(&self) {
        self.frames_to_followers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relays_closed(&self, count: usize) {
        self.relays_closed_on_leader_change
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CoordinateMetricsSnapshot {
        CoordinateMetricsSnapshot {
            leases_acquired: self.leases_acquired.load(Ordering::Relaxed),
            leases_renewed: self.leases_renewed.load(Ordering::Relaxed),
            leases_lost: self.leases_lost.load(Ordering::Relaxed),
            leases_released: self.leases_released.load(Ordering::Relaxed),
            lease_errors: self.lease_errors.load(Ordering::Relaxed),
            relay_forwards: self.relay_forwards.load(Ordering::Relaxed),
            relay_retries: self.relay_retries.load(Ordering::Relaxed),
            relay_timeouts: self.relay_timeouts.load(Ordering::Relaxed),
            relay_rejections: self.relay_rejections.load(Ordering::Relaxed),
            frames_to_followers: self.frames_to_followers.load(Ordering::Relaxed),
            relays_closed_on_leader_change: self
                .relays_closed_on_leader_change
                .load(Ordering::Relaxed),
        }
    }
}
