//! Session lifetime configuration.

use serde::{Deserialize, Serialize};

/// Session registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// TTL of the three cache mirror keys of a session.
    #[serde(default = "default_mirror_ttl")]
    pub mirror_ttl_hours: u64,
    /// Inactivity after which an active session is considered abandoned.
    /// The only staleness window used by the expiry sweep.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_minutes: u64,
    /// Ended sessions older than this are purged from the durable store.
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    /// Minimum spacing between `last_activity` writes for one connection.
    #[serde(default = "default_touch_interval")]
    pub activity_touch_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mirror_ttl_hours: default_mirror_ttl(),
            idle_timeout_minutes: default_idle_timeout(),
            retention_days: default_retention_days(),
            activity_touch_interval_seconds: default_touch_interval(),
        }
    }
}

fn default_mirror_ttl() -> u64 {
    24
}

fn default_idle_timeout() -> u64 {
    120
}

fn default_retention_days() -> u64 {
    7
}

fn default_touch_interval() -> u64 {
    60
}
