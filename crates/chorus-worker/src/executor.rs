//! Job handler trait and isolated execution.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use chorus_core::error::AppError;

/// A unit of periodic work.
#[async_trait]
pub trait JobHandler: Send + Sync + std::fmt::Debug {
    /// Name used in logs and for registration.
    fn job_type(&self) -> &str;

    /// Run once. The returned value, if any, is logged as the run summary.
    async fn execute(&self) -> Result<Option<Value>, JobExecutionError>;
}

/// Error from job execution
#[derive(Debug, thiserror::Error)]
pub enum JobExecutionError {
    /// The job cannot succeed until something outside it changes.
    #[error("Permanent job failure: {0}")]
    Permanent(String),

    /// The next run may succeed.
    #[error("Transient job failure: {0}")]
    Transient(String),

    #[error("Internal error: {0}")]
    Internal(#[from] AppError),
}

/// How a single run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded(Option<Value>),
    Failed(String),
    Panicked,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// Run one job, containing its errors and panics so they never reach the
/// scheduler or any other job.
pub async fn run_isolated(handler: &dyn JobHandler) -> JobOutcome {
    let job = handler.job_type().to_string();
    let started = Instant::now();

    let outcome = match AssertUnwindSafe(handler.execute()).catch_unwind().await {
        Ok(Ok(summary)) => JobOutcome::Succeeded(summary),
        Ok(Err(e)) => JobOutcome::Failed(e.to_string()),
        Err(_) => JobOutcome::Panicked,
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match &outcome {
        JobOutcome::Succeeded(summary) => debug!(
            job = %job,
            elapsed_ms,
            summary = %summary.as_ref().unwrap_or(&serde_json::Value::Null),
            "Job completed"
        ),
        JobOutcome::Failed(message) => {
            warn!(job = %job, elapsed_ms, error = %message, "Job failed")
        }
        JobOutcome::Panicked => error!(job = %job, elapsed_ms, "Job panicked"),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Fixed(&'static str);

    #[async_trait]
    impl JobHandler for Fixed {
        fn job_type(&self) -> &str {
            self.0
        }

        async fn execute(&self) -> Result<Option<Value>, JobExecutionError> {
            match self.0 {
                "ok" => Ok(Some(serde_json::json!({"done": 1}))),
                "transient" => Err(JobExecutionError::Transient("cache down".into())),
                "internal" => Err(AppError::database("connection reset").into()),
                _ => panic!("boom"),
            }
        }
    }

    #[tokio::test]
    async fn test_success_carries_summary() {
        let outcome = run_isolated(&Fixed("ok")).await;
        assert_eq!(
            outcome,
            JobOutcome::Succeeded(Some(serde_json::json!({"done": 1})))
        );
    }

    #[tokio::test]
    async fn test_errors_are_contained() {
        let outcome = run_isolated(&Fixed("transient")).await;
        assert_eq!(
            outcome,
            JobOutcome::Failed("Transient job failure: cache down".to_string())
        );
        let outcome = run_isolated(&Fixed("internal")).await;
        assert!(matches!(outcome, JobOutcome::Failed(m) if m.starts_with("Internal error")));
    }

    #[tokio::test]
    async fn test_panics_are_contained() {
        assert_eq!(run_isolated(&Fixed("panic")).await, JobOutcome::Panicked);
    }
}
