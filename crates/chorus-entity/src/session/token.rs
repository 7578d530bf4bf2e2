//! Refresh-token store record and issued token pair.

use chrono::{DateTime, Utc};
use chorus_core::types::UserId;
use serde::{Deserialize, Serialize};

/// Value stored under `refresh_token:{jti}`. Its presence is what makes the
/// refresh token redeemable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub jti: String,
    pub user_id: UserId,
    pub username: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Tokens returned on login, register and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub token_type: String,
}
