//! Socket gateway and fanout configuration.

use serde::{Deserialize, Serialize};

/// Real-time engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Identifier of this process in fanout envelopes. Generated when empty.
    #[serde(default)]
    pub node_id: String,
    /// Outbound frame buffer per connection.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer_size: usize,
    /// Maximum inbound frame size in bytes.
    #[serde(default = "default_max_message")]
    pub max_message_bytes: usize,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Silence after which a connection is treated as disconnected.
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_seconds: u64,
    /// Fanout backend: `"memory"` (single process) or `"redis"`.
    #[serde(default = "default_fanout_backend")]
    pub fanout_backend: String,
    /// Pub/sub channel carrying fanout envelopes between processes.
    #[serde(default = "default_fanout_channel")]
    pub fanout_channel: String,
    #[serde(default = "default_resubscribe_min")]
    pub resubscribe_backoff_min_ms: u64,
    #[serde(default = "default_resubscribe_max")]
    pub resubscribe_backoff_max_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            outbound_buffer_size: default_outbound_buffer(),
            max_message_bytes: default_max_message(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            heartbeat_timeout_seconds: default_heartbeat_timeout(),
            fanout_backend: default_fanout_backend(),
            fanout_channel: default_fanout_channel(),
            resubscribe_backoff_min_ms: default_resubscribe_min(),
            resubscribe_backoff_max_ms: default_resubscribe_max(),
        }
    }
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_max_message() -> usize {
    64 * 1024
}

fn default_heartbeat_interval() -> u64 {
    25
}

fn default_heartbeat_timeout() -> u64 {
    60
}

fn default_fanout_backend() -> String {
    "memory".to_string()
}

fn default_fanout_channel() -> String {
    "chorus:fanout".to_string()
}

fn default_resubscribe_min() -> u64 {
    250
}

fn default_resubscribe_max() -> u64 {
    10_000
}
