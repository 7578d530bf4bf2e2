//! Session entity model.

use chrono::{DateTime, Utc};
use chorus_core::types::{ConnectionId, SessionId, UserId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Durable record of one authenticated connection's lifetime.
///
/// The database row is the source of truth; the cache mirrors are a
/// lookup accelerator and may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    /// Login time.
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    /// Logout time, set when the session is ended.
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Whether the session has seen no activity since `cutoff`.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.is_active && self.last_activity < cutoff
    }

    /// Mark the record ended at `now`. Ending twice keeps the first time.
    pub fn end(&mut self, now: DateTime<Utc>) {
        if self.is_active {
            self.is_active = false;
            self.ended_at = Some(now);
        }
    }
}

/// Data required to create a new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSession {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Value stored under `sessions:details:{sessionId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl From<&Session> for SessionSnapshot {
    fn from(s: &Session) -> Self {
        Self {
            session_id: s.id,
            user_id: s.user_id,
            connection_id: s.connection_id,
            user_agent: s.user_agent.clone(),
            ip_address: s.ip_address.clone(),
            created_at: s.created_at,
            is_active: s.is_active,
        }
    }
}

/// Value stored under `sessions:user:{userId}`: the user's latest session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSessionPointer {
    pub session_id: SessionId,
    pub connection_id: ConnectionId,
}
