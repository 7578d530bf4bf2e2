//! Periodic job configuration.

use serde::{Deserialize, Serialize};

/// Cleanup scheduler configuration. Each job has its own interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the scheduler starts at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_group_purge")]
    pub group_purge_interval_seconds: u64,
    #[serde(default = "default_session_sweep")]
    pub session_sweep_interval_seconds: u64,
    #[serde(default = "default_reconcile")]
    pub mirror_reconcile_interval_seconds: u64,
    /// Zero disables the diagnostics job.
    #[serde(default = "default_diagnostics")]
    pub diagnostics_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            group_purge_interval_seconds: default_group_purge(),
            session_sweep_interval_seconds: default_session_sweep(),
            mirror_reconcile_interval_seconds: default_reconcile(),
            diagnostics_interval_seconds: default_diagnostics(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_group_purge() -> u64 {
    60
}

fn default_session_sweep() -> u64 {
    300
}

fn default_reconcile() -> u64 {
    900
}

fn default_diagnostics() -> u64 {
    300
}
