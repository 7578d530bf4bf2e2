//! Ping/pong keepalive.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;
use tracing::{debug, warn};

use super::handle::ConnectionHandle;
use crate::message::OutboundMessage;

#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    /// Silence after which the connection is considered gone.
    pub timeout: Duration,
}

/// Why the heartbeat loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatExit {
    /// The client stayed silent past the timeout.
    TimedOut,
    /// The connection was closed by someone else.
    Closed,
}

/// Ping the client every interval until it goes silent or closes.
pub async fn run_heartbeat(handle: Arc<ConnectionHandle>, config: HeartbeatConfig) -> HeartbeatExit {
    let mut ticker = time::interval(config.interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // The first tick fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = handle.closed() => {
                debug!(connection_id = %handle.id, "Heartbeat stopped: connection closed");
                return HeartbeatExit::Closed;
            }
            _ = ticker.tick() => {}
        }

        let silent_for = handle.since_last_seen();
        if silent_for > config.timeout {
            warn!(
                connection_id = %handle.id,
                silent_ms = silent_for.as_millis() as u64,
                "Heartbeat timeout"
            );
            return HeartbeatExit::TimedOut;
        }

        if !handle.send(OutboundMessage::Ping {
            timestamp: Utc::now().timestamp_millis(),
        }) && !handle.is_alive()
        {
            return HeartbeatExit::Closed;
        }
    }
}
