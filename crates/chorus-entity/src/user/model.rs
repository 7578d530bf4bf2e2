//! User entity model.

use chrono::{DateTime, Utc};
use chorus_core::types::UserId;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::role::UserRole;
use super::status::UserStatus;

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: UserId,
    /// Unique login name, also the display handle in rooms.
    pub username: String,
    pub email: String,
    /// Argon2 PHC string.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Whether the account may authenticate or refresh tokens.
    pub fn is_active(&self) -> bool {
        self.status.can_login()
    }
}

/// Data required to create a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    /// Pre-hashed password.
    pub password_hash: String,
    pub role: UserRole,
}
