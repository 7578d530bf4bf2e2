//! Realtime engine metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Engine-level counters.
#[derive(Debug, Default)]
pub struct RealtimeMetrics {
    /// Connections ever accepted
    pub connections_total: AtomicU64,
    /// Handshakes refused before any state was created
    pub handshakes_rejected: AtomicU64,
    /// Inbound frames processed
    pub frames_received: AtomicU64,
    /// Inbound frames whose handling failed
    pub handler_errors: AtomicU64,
    /// Envelopes handed to the fanout backend
    pub fanout_published: AtomicU64,
    /// Envelopes received from other processes
    pub fanout_received: AtomicU64,
    /// Publish attempts the backend refused
    pub fanout_publish_failures: AtomicU64,
}

impl RealtimeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connect(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.handshakes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.fanout_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.fanout_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.fanout_publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Counter values; gauges are left at zero for the caller to fill.
    pub fn snapshot(&self) -> RealtimeMetricsSnapshot {
        RealtimeMetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            handshakes_rejected: self.handshakes_rejected.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            fanout_published: self.fanout_published.load(Ordering::Relaxed),
            fanout_received: self.fanout_received.load(Ordering::Relaxed),
            fanout_publish_failures: self.fanout_publish_failures.load(Ordering::Relaxed),
            ..RealtimeMetricsSnapshot::default()
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeMetricsSnapshot {
    pub connections_total: u64,
    pub handshakes_rejected: u64,
    pub frames_received: u64,
    pub handler_errors: u64,
    pub fanout_published: u64,
    pub fanout_received: u64,
    pub fanout_publish_failures: u64,
    /// Live connections on this process
    pub connections_active: usize,
    pub online_users: usize,
    pub groups: usize,
    pub rooms: usize,
    /// Whether the fanout backend is currently unreachable
    pub fanout_degraded: bool,
}
