//! Runtime counters shared by every actor instance of a manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Node-wide actor metrics
#[derive(Debug, Default)]
pub struct ActorMetrics {
    pub actors_started: AtomicU64,
    pub actors_stopped: AtomicU64,

    // Action dispatch
    pub actions_executed: AtomicU64,
    pub action_failures: AtomicU64,
    pub action_timeouts: AtomicU64,
    pub total_action_time_ns: AtomicU64,

    pub broadcasts_sent: AtomicU64,

    // Connection lifecycle
    pub connections_opened: AtomicU64,
    pub connections_closed: AtomicU64,
    pub connections_evicted: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub reconnects: AtomicU64,
    pub unauthorized_attempts: AtomicU64,
    pub protocol_violations: AtomicU64,

    // Alarms and persistence
    pub alarms_fired: AtomicU64,
    pub alarm_failures: AtomicU64,
    pub persistence_writes: AtomicU64,
}

/// Plain copy of [`ActorMetrics`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActorMetricsSnapshot {
    pub actors_started: u64,
    pub actors_stopped: u64,
    pub actions_executed: u64,
    pub action_failures: u64,
    pub action_timeouts: u64,
    pub avg_action_time_ns: f64,
    pub broadcasts_sent: u64,
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub connections_evicted: u64,
    pub connections_rejected: u64,
    pub reconnects: u64,
    pub unauthorized_attempts: u64,
    pub protocol_violations: u64,
    pub alarms_fired: u64,
    pub alarm_failures: u64,
    pub persistence_writes: u64,
}

impl ActorMetrics {
    pub fn record_actor_started(&self) {
        self.actors_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_actor_stopped(&self) {
        self.actors_stopped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished handler run
    pub fn record_action(&self, duration: Duration, success: bool) {
        self.actions_executed.fetch_add(1, Ordering::Relaxed);
        self.total_action_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        if !success {
            self.action_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_action_timeout(&self) {
        self.action_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.broadcasts_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_opened(&self, reconnect: bool) {
        if reconnect {
            self.reconnects.fetch_add(1, Ordering::Relaxed);
        } else {
            self.connections_opened.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a connection teardown; `evicted` marks liveness evictions
    pub fn record_connection_closed(&self, evicted: bool) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
        if evicted {
            self.connections_evicted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unauthorized(&self) {
        self.unauthorized_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_protocol_violation(&self) {
        self.protocol_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alarm(&self, success: bool) {
        self.alarms_fired.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.alarm_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_persistence_write(&self) {
        self.persistence_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_action_time_ns(&self) -> f64 {
        let count = self.actions_executed.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total = self.total_action_time_ns.load(Ordering::Relaxed);
        total as f64 / count as f64
    }

    pub fn snapshot(&self) -> ActorMetricsSnapshot {
        ActorMetricsSnapshot {
            actors_started: self.actors_started.load(Ordering::Relaxed),
            actors_stopped: self.actors_stopped.load(Ordering::Relaxed),
            actions_executed: self.actions_executed.load(Ordering::Relaxed),
            action_failures: self.action_failures.load(Ordering::Relaxed),
            action_timeouts: self.action_timeouts.load(Ordering::Relaxed),
            avg_action_time_ns: self.avg_action_time_ns(),
            broadcasts_sent: self.broadcasts_sent.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            connections_evicted: self.connections_evicted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            unauthorized_attempts: self.unauthorized_attempts.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
            alarms_fired: self.alarms_fired.load(Ordering::Relaxed),
            alarm_failures: self.alarm_failures.load(Ordering::Relaxed),
            persistence_writes: self.persistence_writes.load(Ordering::Relaxed),
        }
    }
}
