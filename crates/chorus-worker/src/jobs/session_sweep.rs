//! Idle-session sweep.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use chorus_auth::SessionRegistry;
use chorus_realtime::Gateway;

use crate::executor::{JobExecutionError, JobHandler};

/// Ends sessions idle longer than the configured window, closes any of
/// their sockets still open on this process, then deletes ended sessions
/// past retention.
#[derive(Debug)]
pub struct SessionSweepJob {
    sessions: Arc<SessionRegistry>,
    gateway: Arc<Gateway>,
}

impl SessionSweepJob {
    pub fn new(sessions: Arc<SessionRegistry>, gateway: Arc<Gateway>) -> Self {
        Self { sessions, gateway }
    }
}

#[async_trait]
impl JobHandler for SessionSweepJob {
    fn job_type(&self) -> &str {
        "session_sweep"
    }

    async fn execute(&self) -> Result<Option<Value>, JobExecutionError> {
        let ended = self
            .sessions
            .cleanup_expired_sessions(self.sessions.idle_timeout())
            .await?;
        let disconnected = self
            .gateway
            .disconnect_sessions(&ended, "session_expired")
            .await;
        let purged = self.sessions.purge_ended_sessions().await?;

        if disconnected > 0 {
            info!(disconnected, "Closed sockets of expired sessions");
        }
        Ok(Some(json!({
            "ended": ended.len(),
            "disconnected": disconnected,
            "purged": purged,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::test_support::Fixture;
    use chorus_realtime::message::OutboundMessage;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_idle_session_is_ended_without_disconnect_event() {
        let f = Fixture::new();
        let (idle, mut idle_rx) = f.connect("idle").await;
        let (fresh, _fresh_rx) = f.connect("fresh").await;
        f.sessions_repo
            .set_last_activity(idle.session_id, Utc::now() - Duration::hours(3))
            .await;

        let job = SessionSweepJob::new(f.sessions.clone(), f.engine.gateway.clone());
        let summary = job.execute().await.unwrap().unwrap();
        assert_eq!(summary["ended"], 1);
        assert_eq!(summary["disconnected"], 1);

        let record = f
            .sessions
            .session_for_connection(idle.id)
            .await
            .unwrap();
        assert!(record.is_none());
        assert!(f.engine.pool.get(idle.id).is_none());
        assert!(f.engine.pool.get(fresh.id).is_some());

        let mut reasons = Vec::new();
        while let Ok(msg) = idle_rx.try_recv() {
            if let OutboundMessage::ForceDisconnect { reason } = msg {
                reasons.push(reason);
            }
        }
        assert_eq!(reasons, ["session_expired"]);
    }

    #[tokio::test]
    async fn test_old_ended_sessions_are_purged() {
        let f = Fixture::new();
        let (conn, _rx) = f.connect("gone").await;
        f.engine.gateway.disconnect(conn.id, "client_disconnect").await;
        f.sessions_repo
            .set_ended_at(conn.session_id, Utc::now() - Duration::days(8))
            .await;

        let job = SessionSweepJob::new(f.sessions.clone(), f.engine.gateway.clone());
        let summary = job.execute().await.unwrap().unwrap();
        assert_eq!(summary["purged"], 1);
        assert!(f.sessions_repo.is_empty().await);
    }
}
