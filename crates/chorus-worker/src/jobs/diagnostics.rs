//! Periodic diagnostics log line.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use chorus_auth::SessionRegistry;
use chorus_realtime::Gateway;

use crate::executor::{JobExecutionError, JobHandler};

#[derive(Debug)]
pub struct DiagnosticsJob {
    gateway: Arc<Gateway>,
    sessions: Arc<SessionRegistry>,
}

impl DiagnosticsJob {
    pub fn new(gateway: Arc<Gateway>, sessions: Arc<SessionRegistry>) -> Self {
        Self { gateway, sessions }
    }
}

#[async_trait]
impl JobHandler for DiagnosticsJob {
    fn job_type(&self) -> &str {
        "diagnostics"
    }

    async fn execute(&self) -> Result<Option<Value>, JobExecutionError> {
        let snapshot = self.gateway.metrics_snapshot().await;
        let active_sessions = self.sessions.count_active().await?;

        info!(
            node_id = %self.gateway.fanout().node_id(),
            connections = snapshot.connections_active,
            online_users = snapshot.online_users,
            groups = snapshot.groups,
            rooms = snapshot.rooms,
            active_sessions,
            fanout_published = snapshot.fanout_published,
            fanout_received = snapshot.fanout_received,
            fanout_degraded = snapshot.fanout_degraded,
            "Realtime diagnostics"
        );

        let mut summary = serde_json::to_value(&snapshot)
            .map_err(|e| JobExecutionError::Permanent(format!("Unserializable snapshot: {e}")))?;
        summary["active_sessions"] = Value::from(active_sessions);
        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::test_support::Fixture;

    #[tokio::test]
    async fn test_snapshot_reflects_live_state() {
        let f = Fixture::new();
        let (a, _a_rx) = f.connect("a").await;
        let (_b, _b_rx) = f.connect("b").await;
        f.engine
            .presence
            .create_group("lobby", a.user_id)
            .await
            .unwrap();

        let job = DiagnosticsJob::new(f.engine.gateway.clone(), f.sessions.clone());
        let summary = job.execute().await.unwrap().unwrap();
        assert_eq!(summary["connections_active"], 2);
        assert_eq!(summary["online_users"], 2);
        assert_eq!(summary["groups"], 1);
        assert_eq!(summary["active_sessions"], 2);
        assert_eq!(summary["fanout_degraded"], false);
    }
}
