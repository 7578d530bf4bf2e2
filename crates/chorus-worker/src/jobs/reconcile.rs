//! Session mirror reconciliation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use chorus_auth::SessionRegistry;

use crate::executor::{JobExecutionError, JobHandler};

/// Clears cache mirrors left behind by sessions that are no longer active.
#[derive(Debug)]
pub struct MirrorReconcileJob {
    sessions: Arc<SessionRegistry>,
}

impl MirrorReconcileJob {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl JobHandler for MirrorReconcileJob {
    fn job_type(&self) -> &str {
        "mirror_reconcile"
    }

    async fn execute(&self) -> Result<Option<Value>, JobExecutionError> {
        let report = self.sessions.reconcile_mirrors().await?;
        Ok(Some(json!({
            "scanned": report.scanned,
            "removed": report.removed,
        })))
    }
}
