//! Repository traits and their Postgres and in-memory implementations.

pub mod memory;
pub mod session;
pub mod user;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use chorus_core::result::AppResult;
use chorus_core::types::{ConnectionId, SessionId, UserId};
use chorus_entity::session::{CreateSession, Session};
use chorus_entity::user::{CreateUser, User};

pub use memory::{MemorySessionRepository, MemoryUserRepository};
pub use session::PgSessionRepository;
pub use user::PgUserRepository;

/// Account storage.
#[async_trait]
pub trait UserRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Insert a new account. Fails with `Conflict` on a duplicate username or email.
    async fn create(&self, data: &CreateUser) -> AppResult<User>;

    async fn find_by_id(&self, id: UserId) -> AppResult<Option<User>>;

    /// Case-insensitive lookup.
    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>>;

    /// Case-insensitive lookup.
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn update_password(&self, id: UserId, password_hash: &str) -> AppResult<()>;

    async fn update_last_login(&self, id: UserId, at: DateTime<Utc>) -> AppResult<()>;
}

/// Durable session storage. The source of truth for session state.
#[async_trait]
pub trait SessionRepository: Send + Sync + std::fmt::Debug + 'static {
    async fn create(&self, data: &CreateSession) -> AppResult<Session>;

    async fn find_by_id(&self, id: SessionId) -> AppResult<Option<Session>>;

    /// The active session bound to a connection, if any.
    async fn find_active_by_connection(
        &self,
        connection_id: ConnectionId,
    ) -> AppResult<Option<Session>>;

    /// Active sessions of a user, newest first.
    async fn find_active_by_user(&self, user_id: UserId) -> AppResult<Vec<Session>>;

    /// Mark a session inactive. Returns the record as stored afterwards, or
    /// `None` when it does not exist. An already-ended record keeps its
    /// original `ended_at`.
    async fn end(&self, id: SessionId, at: DateTime<Utc>) -> AppResult<Option<Session>>;

    /// End every active session of a user, returning the ones that changed.
    async fn end_all_for_user(&self, user_id: UserId, at: DateTime<Utc>)
    -> AppResult<Vec<Session>>;

    /// End every active session idle since before `cutoff`, returning them.
    async fn end_stale(&self, cutoff: DateTime<Utc>, at: DateTime<Utc>)
    -> AppResult<Vec<Session>>;

    /// Bump `last_activity` of an active session. Returns `false` when the
    /// session is missing or already ended.
    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> AppResult<bool>;

    /// Delete ended sessions whose `ended_at` predates `cutoff`.
    async fn purge_ended_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;

    async fn count_active(&self) -> AppResult<i64>;
}
