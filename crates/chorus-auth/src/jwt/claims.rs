//! JWT claims shared by access and refresh tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chorus_core::types::UserId;
use chorus_entity::user::UserRole;

/// Claims payload of every token Chorus signs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user ID.
    pub sub: UserId,
    pub username: String,
    pub role: UserRole,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique token id. For refresh tokens this is the revocation handle.
    pub jti: String,
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

impl Claims {
    pub fn user_id(&self) -> UserId {
        self.sub
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }

    /// Remaining lifetime in seconds, 0 once expired.
    pub fn remaining_ttl_seconds(&self) -> u64 {
        (self.exp - Utc::now().timestamp()).max(0) as u64
    }
}
