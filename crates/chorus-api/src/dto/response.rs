//! Response DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use chorus_core::types::{SessionId, UserId};
use chorus_entity::session::{Session, TokenPair};
use chorus_entity::user::User;

#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

/// Register and login response.
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub id: SessionId,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    pub logout_time: Option<DateTime<Utc>>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            login_time: session.created_at,
            last_activity: session.last_activity,
            is_active: session.is_active,
            logout_time: session.ended_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Sessions ended by a request, and how many live sockets were closed.
#[derive(Debug, Clone, Serialize)]
pub struct EndedSessionsResponse {
    pub ended: usize,
    pub disconnected: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub node_id: String,
    pub uptime_seconds: u64,
    pub cache: bool,
    /// `None` when no durable database is configured.
    pub database: Option<bool>,
    pub connections: usize,
    pub online_users: usize,
    pub fanout_degraded: bool,
}
