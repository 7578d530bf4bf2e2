//! In-memory repositories.
//!
//! Non-durable stand-ins for the Postgres repositories, used by tests and by
//! single-process runs with `database.backend = "memory"`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use chorus_core::error::AppError;
use chorus_core::result::AppResult;
use chorus_core::types::{ConnectionId, SessionId, UserId};
use chorus_entity::session::{CreateSession, Session};
use chorus_entity::user::{CreateUser, User, UserStatus};

use super::{SessionRepository, UserRepository};

#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change an account's status directly.
    pub async fn set_status(&self, id: UserId, status: UserStatus) -> AppResult<()> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("User not found"))?;
        user.status = status;
        user.updated_at = Utc::now();
        Ok(())
    }

    /// Remove an account.
    pub async fn remove(&self, id: UserId) -> bool {
        self.users.write().await.remove(&id).is_some()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, data: &CreateUser) -> AppResult<User> {
        let mut users = self.users.write().await;
        let taken = users.values().any(|u| {
            u.username.eq_ignore_ascii_case(&data.username)
                || u.email.eq_ignore_ascii_case(&data.email)
        });
        if taken {
            return Err(AppError::conflict("Username or email already registered"));
        }

        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            username: data.username.clone(),
            email: data.email.clone(),
            password_hash: data.password_hash.clone(),
            role: data.role,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> AppResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_password(&self, id: UserId, password_hash: &str) -> AppResult<()> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("User not found"))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn update_last_login(&self, id: UserId, at: DateTime<Utc>) -> AppResult<()> {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionRepository {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite `last_activity` of a session, ignoring monotonicity.
    pub async fn set_last_activity(&self, id: SessionId, at: DateTime<Utc>) -> bool {
        match self.sessions.write().await.get_mut(&id) {
            Some(s) => {
                s.last_activity = at;
                true
            }
            None => false,
        }
    }

    /// Overwrite `ended_at` of a session.
    pub async fn set_ended_at(&self, id: SessionId, at: DateTime<Utc>) -> bool {
        match self.sessions.write().await.get_mut(&id) {
            Some(s) => {
                s.ended_at = Some(at);
                true
            }
            None => false,
        }
    }

    /// Total records, active or not.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create(&self, data: &CreateSession) -> AppResult<Session> {
        let now = Utc::now();
        let session = Session {
            id: SessionId::new(),
            user_id: data.user_id,
            connection_id: data.connection_id,
            user_agent: data.user_agent.clone(),
            ip_address: data.ip_address.clone(),
            created_at: now,
            last_activity: now,
            is_active: true,
            ended_at: None,
        };
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_by_id(&self, id: SessionId) -> AppResult<Option<Session>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn find_active_by_connection(
        &self,
        connection_id: ConnectionId,
    ) -> AppResult<Option<Session>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_active && s.connection_id == connection_id)
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn find_active_by_user(&self, user_id: UserId) -> AppResult<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_active && s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn end(&self, id: SessionId, at: DateTime<Utc>) -> AppResult<Option<Session>> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.get_mut(&id).map(|s| {
            s.end(at);
            s.clone()
        }))
    }

    async fn end_all_for_user(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Session>> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .values_mut()
            .filter(|s| s.is_active && s.user_id == user_id)
            .map(|s| {
                s.end(at);
                s.clone()
            })
            .collect())
    }

    async fn end_stale(&self, cutoff: DateTime<Utc>, at: DateTime<Utc>) -> AppResult<Vec<Session>> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .values_mut()
            .filter(|s| s.is_stale(cutoff))
            .map(|s| {
                s.end(at);
                s.clone()
            })
            .collect())
    }

    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> AppResult<bool> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&id) {
            Some(s) if s.is_active => {
                s.last_activity = s.last_activity.max(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_ended_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.is_active || s.ended_at.is_none_or(|ended| ended >= cutoff));
        Ok((before - sessions.len()) as u64)
    }

    async fn count_active(&self) -> AppResult<i64> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_active)
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_entity::user::UserRole;
    use chrono::Duration;

    fn new_session(user_id: UserId) -> CreateSession {
        CreateSession {
            user_id,
            connection_id: ConnectionId::new(),
            user_agent: Some("test-agent".to_string()),
            ip_address: Some("127.0.0.1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let repo = MemoryUserRepository::new();
        let data = CreateUser {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "hash".to_string(),
            role: UserRole::Member,
        };
        repo.create(&data).await.expect("first insert");

        let dup = CreateUser {
            username: "ALICE".to_string(),
            email: "other@example.com".to_string(),
            ..data
        };
        let err = repo.create(&dup).await.unwrap_err();
        assert_eq!(err.kind, chorus_core::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_end_stale_only_touches_idle_active_sessions() {
        let repo = MemorySessionRepository::new();
        let user = UserId::new();
        let idle = repo.create(&new_session(user)).await.unwrap();
        let fresh = repo.create(&new_session(user)).await.unwrap();
        repo.set_last_activity(idle.id, Utc::now() - Duration::hours(3))
            .await;

        let cutoff = Utc::now() - Duration::hours(2);
        let ended = repo.end_stale(cutoff, Utc::now()).await.unwrap();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].id, idle.id);

        let fresh_now = repo.find_by_id(fresh.id).await.unwrap().unwrap();
        assert!(fresh_now.is_active);
    }

    #[tokio::test]
    async fn test_purge_keeps_recent_and_active() {
        let repo = MemorySessionRepository::new();
        let user = UserId::new();
        let old = repo.create(&new_session(user)).await.unwrap();
        let recent = repo.create(&new_session(user)).await.unwrap();
        let _active = repo.create(&new_session(user)).await.unwrap();

        repo.end(old.id, Utc::now()).await.unwrap();
        repo.set_ended_at(old.id, Utc::now() - Duration::days(8)).await;
        repo.end(recent.id, Utc::now()).await.unwrap();

        let purged = repo
            .purge_ended_before(Utc::now() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(repo.len().await, 2);
    }

    #[tokio::test]
    async fn test_touch_ignores_ended_sessions() {
        let repo = MemorySessionRepository::new();
        let s = repo.create(&new_session(UserId::new())).await.unwrap();
        assert!(repo.touch(s.id, Utc::now()).await.unwrap());
        repo.end(s.id, Utc::now()).await.unwrap();
        assert!(!repo.touch(s.id, Utc::now()).await.unwrap());
    }
}
