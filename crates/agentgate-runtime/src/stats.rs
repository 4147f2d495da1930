//! Gateway counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Increment by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by `n`
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Live counters owned by a gateway.
#[derive(Debug, Default)]
pub struct GatewayStats {
    pub(crate) connections_accepted: Counter,
    pub(crate) connections_closed: Counter,
    pub(crate) types_declared: Counter,
    pub(crate) requests_routed: Counter,
    pub(crate) requests_unroutable: Counter,
    pub(crate) requests_rejected: Counter,
    pub(crate) requests_expired: Counter,
    pub(crate) requests_orphaned: Counter,
    pub(crate) responses_routed: Counter,
    pub(crate) responses_dropped: Counter,
    pub(crate) events_published: Counter,
    pub(crate) event_deliveries: Counter,
    pub(crate) dispatch_failures: Counter,
}

impl GatewayStats {
    /// Point-in-time copy.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.get(),
            connections_closed: self.connections_closed.get(),
            types_declared: self.types_declared.get(),
            requests_routed: self.requests_routed.get(),
            requests_unroutable: self.requests_unroutable.get(),
            requests_rejected: self.requests_rejected.get(),
            requests_expired: self.requests_expired.get(),
            requests_orphaned: self.requests_orphaned.get(),
            responses_routed: self.responses_routed.get(),
            responses_dropped: self.responses_dropped.get(),
            events_published: self.events_published.get(),
            event_deliveries: self.event_deliveries.get(),
            dispatch_failures: self.dispatch_failures.get(),
        }
    }
}

/// Serializable counters snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Connections accepted since start
    pub connections_accepted: u64,
    /// Connections removed since start
    pub connections_closed: u64,
    /// Successful type declarations
    pub types_declared: u64,
    /// Requests forwarded to a target
    pub requests_routed: u64,
    /// Requests with no eligible connection
    pub requests_unroutable: u64,
    /// Requests rejected by the type registry
    pub requests_rejected: u64,
    /// Pending requests reaped by timeout
    pub requests_expired: u64,
    /// Pending requests dropped because a connection closed
    pub requests_orphaned: u64,
    /// Responses delivered to their origin
    pub responses_routed: u64,
    /// Responses with no pending entry
    pub responses_dropped: u64,
    /// Broadcast events routed
    pub events_published: u64,
    /// Individual event deliveries
    pub event_deliveries: u64,
    /// Detached dispatches that failed
    pub dispatch_failures: u64,
}
