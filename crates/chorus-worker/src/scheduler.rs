//! Interval scheduler for the maintenance jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use chorus_core::error::AppError;
use chorus_core::result::AppResult;

use crate::executor::{JobHandler, run_isolated};

/// Runs every registered job on its own fixed interval.
///
/// Each run executes in its own task and goes through [`run_isolated`], so
/// a failing or panicking job never delays or stops another one.
pub struct WorkerScheduler {
    scheduler: JobScheduler,
    registered: Vec<String>,
}

impl std::fmt::Debug for WorkerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerScheduler")
            .field("registered", &self.registered)
            .finish()
    }
}

impl WorkerScheduler {
    pub async fn new() -> AppResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;

        Ok(Self {
            scheduler,
            registered: Vec::new(),
        })
    }

    /// Schedule `handler` every `interval`. The first run happens one
    /// interval after [`start`](Self::start).
    pub async fn register(
        &mut self,
        handler: Arc<dyn JobHandler>,
        interval: Duration,
    ) -> AppResult<()> {
        // Repeated jobs tick in whole seconds.
        if interval.as_secs() == 0 {
            return Err(AppError::configuration(format!(
                "Job '{}' needs an interval of at least one second",
                handler.job_type()
            )));
        }
        let job_type = handler.job_type().to_string();

        let job = Job::new_repeated_async(interval, move |_uuid, _lock| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                run_isolated(handler.as_ref()).await;
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create {job_type} schedule: {e}")))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add {job_type} schedule: {e}")))?;

        info!(
            job = %job_type,
            interval_secs = interval.as_secs(),
            "Registered job"
        );
        self.registered.push(job_type);
        Ok(())
    }

    /// Names of the registered jobs, in registration order.
    pub fn registered(&self) -> &[String] {
        &self.registered
    }

    pub async fn start(&self) -> AppResult<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;

        info!(jobs = self.registered.len(), "Worker scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> AppResult<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;

        info!("Worker scheduler shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::JobExecutionError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Counting {
        name: &'static str,
        runs: AtomicUsize,
        fail: bool,
    }

    impl Counting {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                runs: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl JobHandler for Counting {
        fn job_type(&self) -> &str {
            self.name
        }

        async fn execute(&self) -> Result<Option<Value>, JobExecutionError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(JobExecutionError::Transient("always fails".into()));
            }
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_sub_second_interval_is_rejected() {
        let mut scheduler = WorkerScheduler::new().await.unwrap();
        let err = scheduler
            .register(Counting::new("never", false), Duration::from_millis(500))
            .await
            .unwrap_err();
        assert_eq!(err.kind, chorus_core::ErrorKind::Configuration);
        assert!(scheduler.registered().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failing_job_does_not_stop_others() {
        let failing = Counting::new("failing", true);
        let healthy = Counting::new("healthy", false);

        let mut scheduler = WorkerScheduler::new().await.unwrap();
        scheduler
            .register(failing.clone(), Duration::from_secs(1))
            .await
            .unwrap();
        scheduler
            .register(healthy.clone(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(scheduler.registered(), ["failing", "healthy"]);

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(4500)).await;
        scheduler.shutdown().await.unwrap();

        assert!(failing.runs.load(Ordering::SeqCst) >= 2);
        assert!(healthy.runs.load(Ordering::SeqCst) >= 2);
    }
}
