//! Token signing and credential configuration.

use serde::{Deserialize, Serialize};

/// Authentication and token lifetime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC-SHA256 signing secret for both token kinds.
    pub jwt_secret: String,
    /// `iss` claim stamped on and required of every token.
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// `aud` claim stamped on and required of every token.
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_seconds: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_seconds: u64,
    /// Upper bound on concurrently valid refresh tokens per user.
    #[serde(default = "default_max_refresh_tokens")]
    pub max_refresh_tokens_per_user: usize,
    /// Clock skew tolerated when checking `exp`.
    #[serde(default = "default_leeway")]
    pub leeway_seconds: u64,
    #[serde(default = "default_password_min")]
    pub password_min_length: usize,
    /// Minimum zxcvbn score (0-4) a new password must reach.
    #[serde(default = "default_password_score")]
    pub password_min_score: u8,
}

impl AuthConfig {
    /// Defaults for every field around the given secret.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            issuer: default_issuer(),
            audience: default_audience(),
            access_token_ttl_seconds: default_access_ttl(),
            refresh_token_ttl_seconds: default_refresh_ttl(),
            max_refresh_tokens_per_user: default_max_refresh_tokens(),
            leeway_seconds: default_leeway(),
            password_min_length: default_password_min(),
            password_min_score: default_password_score(),
        }
    }
}

fn default_issuer() -> String {
    "chorus".to_string()
}

fn default_audience() -> String {
    "chorus-clients".to_string()
}

fn default_access_ttl() -> u64 {
    3600
}

fn default_refresh_ttl() -> u64 {
    7 * 24 * 3600
}

fn default_max_refresh_tokens() -> usize {
    5
}

fn default_leeway() -> u64 {
    5
}

fn default_password_min() -> usize {
    8
}

fn default_password_score() -> u8 {
    2
}
