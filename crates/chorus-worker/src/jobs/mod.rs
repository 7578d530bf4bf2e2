//! Built-in maintenance jobs.

pub mod diagnostics;
pub mod group_purge;
pub mod reconcile;
pub mod session_sweep;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use chorus_auth::SessionRegistry;
use chorus_core::config::worker::WorkerConfig;
use chorus_core::result::AppResult;
use chorus_realtime::Gateway;

use crate::executor::JobHandler;
use crate::scheduler::WorkerScheduler;

pub use diagnostics::DiagnosticsJob;
pub use group_purge::GroupPurgeJob;
pub use reconcile::MirrorReconcileJob;
pub use session_sweep::SessionSweepJob;

/// Everything the built-in jobs operate on.
#[derive(Debug, Clone)]
pub struct JobDependencies {
    pub sessions: Arc<SessionRegistry>,
    pub gateway: Arc<Gateway>,
}

/// The built-in jobs enabled by `config`, each paired with its interval.
/// An interval of zero disables that job.
pub fn default_jobs(
    config: &WorkerConfig,
    deps: &JobDependencies,
) -> Vec<(Arc<dyn JobHandler>, Duration)> {
    if !config.enabled {
        return Vec::new();
    }

    let candidates: [(Arc<dyn JobHandler>, u64); 4] = [
        (
            Arc::new(GroupPurgeJob::new(Arc::clone(deps.gateway.presence()))),
            config.group_purge_interval_seconds,
        ),
        (
            Arc::new(SessionSweepJob::new(
                Arc::clone(&deps.sessions),
                Arc::clone(&deps.gateway),
            )),
            config.session_sweep_interval_seconds,
        ),
        (
            Arc::new(MirrorReconcileJob::new(Arc::clone(&deps.sessions))),
            config.mirror_reconcile_interval_seconds,
        ),
        (
            Arc::new(DiagnosticsJob::new(
                Arc::clone(&deps.gateway),
                Arc::clone(&deps.sessions),
            )),
            config.diagnostics_interval_seconds,
        ),
    ];

    candidates
        .into_iter()
        .filter(|(_, secs)| *secs > 0)
        .map(|(job, secs)| (job, Duration::from_secs(secs)))
        .collect()
}

/// Register every enabled built-in job on `scheduler`.
pub async fn register_defaults(
    scheduler: &mut WorkerScheduler,
    config: &WorkerConfig,
    deps: &JobDependencies,
) -> AppResult<()> {
    for (job, interval) in default_jobs(config, deps) {
        scheduler.register(job, interval).await?;
    }
    info!(jobs = scheduler.registered().len(), "Maintenance jobs registered");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::Fixture;
    use super::*;

    #[tokio::test]
    async fn test_default_jobs_follow_config() {
        let f = Fixture::new();
        let names = |config: &WorkerConfig| -> Vec<String> {
            default_jobs(config, &f.deps())
                .into_iter()
                .map(|(job, _)| job.job_type().to_string())
                .collect()
        };

        assert_eq!(
            names(&WorkerConfig::default()),
            ["group_purge", "session_sweep", "mirror_reconcile", "diagnostics"]
        );

        let no_diagnostics = WorkerConfig {
            diagnostics_interval_seconds: 0,
            ..WorkerConfig::default()
        };
        assert!(!names(&no_diagnostics).contains(&"diagnostics".to_string()));

        let disabled = WorkerConfig {
            enabled: false,
            ..WorkerConfig::default()
        };
        assert!(names(&disabled).is_empty());
    }

    #[tokio::test]
    async fn test_intervals_come_from_config() {
        let f = Fixture::new();
        let config = WorkerConfig {
            group_purge_interval_seconds: 7,
            ..WorkerConfig::default()
        };
        let jobs = default_jobs(&config, &f.deps());
        let (_, interval) = jobs
            .iter()
            .find(|(job, _)| job.job_type() == "group_purge")
            .unwrap();
        assert_eq!(*interval, Duration::from_secs(7));
    }
}
