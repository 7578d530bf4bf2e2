//! Postgres session repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use chorus_core::error::{AppError, ErrorKind};
use chorus_core::result::AppResult;
use chorus_core::types::{ConnectionId, SessionId, UserId};
use chorus_entity::session::{CreateSession, Session};

use super::SessionRepository;

#[derive(Debug, Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, context, e)
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, data: &CreateSession) -> AppResult<Session> {
        sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (id, user_id, connection_id, user_agent, ip_address, \
             created_at, last_activity, is_active) \
             VALUES ($1, $2, $3, $4, $5, NOW(), NOW(), TRUE) RETURNING *",
        )
        .bind(SessionId::new())
        .bind(data.user_id)
        .bind(data.connection_id)
        .bind(&data.user_agent)
        .bind(&data.ip_address)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("Failed to create session"))
    }

    async fn find_by_id(&self, id: SessionId) -> AppResult<Option<Session>> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to find session"))
    }

    async fn find_active_by_connection(
        &self,
        connection_id: ConnectionId,
    ) -> AppResult<Option<Session>> {
        sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE connection_id = $1 AND is_active \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(connection_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to find session by connection"))
    }

    async fn find_active_by_user(&self, user_id: UserId) -> AppResult<Vec<Session>> {
        sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE user_id = $1 AND is_active ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to find active sessions"))
    }

    async fn end(&self, id: SessionId, at: DateTime<Utc>) -> AppResult<Option<Session>> {
        sqlx::query_as::<_, Session>(
            "UPDATE sessions SET is_active = FALSE, ended_at = COALESCE(ended_at, $2) \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to end session"))
    }

    async fn end_all_for_user(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Session>> {
        sqlx::query_as::<_, Session>(
            "UPDATE sessions SET is_active = FALSE, ended_at = $2 \
             WHERE user_id = $1 AND is_active RETURNING *",
        )
        .bind(user_id)
        .bind(at)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to end user sessions"))
    }

    async fn end_stale(&self, cutoff: DateTime<Utc>, at: DateTime<Utc>) -> AppResult<Vec<Session>> {
        sqlx::query_as::<_, Session>(
            "UPDATE sessions SET is_active = FALSE, ended_at = $2 \
             WHERE is_active AND last_activity < $1 RETURNING *",
        )
        .bind(cutoff)
        .bind(at)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to end stale sessions"))
    }

    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET last_activity = GREATEST(last_activity, $2) \
             WHERE id = $1 AND is_active",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to touch session"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_ended_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result =
            sqlx::query("DELETE FROM sessions WHERE NOT is_active AND ended_at < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(db_err("Failed to purge ended sessions"))?;
        Ok(result.rows_affected())
    }

    async fn count_active(&self) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE is_active")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("Failed to count active sessions"))
    }
}
