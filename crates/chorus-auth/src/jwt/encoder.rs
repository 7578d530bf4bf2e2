//! JWT token creation.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use uuid::Uuid;

use chorus_core::config::auth::AuthConfig;
use chorus_core::error::AppError;
use chorus_entity::user::User;

use super::claims::{Claims, TokenType};

/// A signed token and its expiry.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub claims: Claims,
}

/// Creates HS256-signed access and refresh tokens.
#[derive(Clone)]
pub struct JwtEncoder {
    encoding_key: EncodingKey,
    issuer: String,
    audience: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl std::fmt::Debug for JwtEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtEncoder")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

impl JwtEncoder {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl_seconds: config.access_token_ttl_seconds as i64,
            refresh_ttl_seconds: config.refresh_token_ttl_seconds as i64,
        }
    }

    /// Sign a short-lived access token for `user`.
    pub fn access_token(&self, user: &User) -> Result<SignedToken, AppError> {
        self.sign(
            user,
            Uuid::new_v4().to_string(),
            TokenType::Access,
            self.access_ttl_seconds,
        )
    }

    /// Sign a refresh token for `user` carrying `jti`.
    pub fn refresh_token(&self, user: &User, jti: &str) -> Result<SignedToken, AppError> {
        self.sign(
            user,
            jti.to_string(),
            TokenType::Refresh,
            self.refresh_ttl_seconds,
        )
    }

    fn sign(
        &self,
        user: &User,
        jti: String,
        token_type: TokenType,
        ttl_seconds: i64,
    ) -> Result<SignedToken, AppError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp: now + ttl_seconds,
            jti,
            token_type,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to encode token: {e}")))?;

        Ok(SignedToken { token, claims })
    }
}
