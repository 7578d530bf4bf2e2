//! Purge groups nobody is in.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use chorus_realtime::PresenceStore;

use crate::executor::{JobExecutionError, JobHandler};

/// Removes groups whose member set is empty, bounding memory held by
/// short-lived groups.
#[derive(Debug)]
pub struct GroupPurgeJob {
    presence: Arc<dyn PresenceStore>,
}

impl GroupPurgeJob {
    pub fn new(presence: Arc<dyn PresenceStore>) -> Self {
        Self { presence }
    }
}

#[async_trait]
impl JobHandler for GroupPurgeJob {
    fn job_type(&self) -> &str {
        "group_purge"
    }

    async fn execute(&self) -> Result<Option<Value>, JobExecutionError> {
        let purged = self.presence.purge_empty_groups().await?;
        if !purged.is_empty() {
            debug!(count = purged.len(), "Purged empty groups");
        }
        Ok(Some(json!({ "purged": purged.len() })))
    }
}
