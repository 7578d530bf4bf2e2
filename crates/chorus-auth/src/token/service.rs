//! Token issuance, single-use rotation and revocation.
//!
//! Access tokens are stateless. A refresh token is only redeemable while
//! `refresh_token:{jti}` exists; `user_refresh_tokens:{userId}` keeps the
//! user's live jtis oldest first and is capped, so issuing past the cap
//! revokes the oldest tokens.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use chorus_cache::CacheManager;
use chorus_cache::keys;
use chorus_core::config::auth::AuthConfig;
use chorus_core::error::AppError;
use chorus_core::result::AppResult;
use chorus_core::traits::cache::CacheProvider;
use chorus_core::types::UserId;
use chorus_database::UserRepository;
use chorus_entity::session::{RefreshTokenRecord, TokenPair};
use chorus_entity::user::User;

use crate::jwt::{Claims, JwtDecoder, JwtEncoder, TokenRejection};

const INVALID_REFRESH: &str = "Invalid or expired refresh token";

#[derive(Debug, Clone)]
pub struct TokenService {
    encoder: JwtEncoder,
    decoder: JwtDecoder,
    cache: Arc<CacheManager>,
    users: Arc<dyn UserRepository>,
    refresh_ttl: Duration,
    max_refresh_tokens: usize,
}

impl TokenService {
    pub fn new(
        config: &AuthConfig,
        cache: Arc<CacheManager>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            encoder: JwtEncoder::new(config),
            decoder: JwtDecoder::new(config),
            cache,
            users,
            refresh_ttl: Duration::from_secs(config.refresh_token_ttl_seconds),
            max_refresh_tokens: config.max_refresh_tokens_per_user,
        }
    }

    /// Sign a fresh access/refresh pair and register the refresh jti.
    pub async fn issue_token_pair(&self, user: &User) -> AppResult<TokenPair> {
        let access = self.encoder.access_token(user)?;
        let jti = Uuid::new_v4().to_string();
        let refresh = self.encoder.refresh_token(user, &jti)?;

        let record = RefreshTokenRecord {
            jti: jti.clone(),
            user_id: user.id,
            username: user.username.clone(),
            issued_at: Utc::now(),
            expires_at: refresh.claims.expires_at(),
        };
        let record_key = keys::refresh_token(&jti);
        self.cache
            .set_json(&record_key, &record, self.refresh_ttl)
            .await?;

        let evicted = match self
            .cache
            .list_push_capped(
                &keys::user_refresh_tokens(user.id),
                &jti,
                self.max_refresh_tokens,
                self.refresh_ttl,
            )
            .await
        {
            Ok(evicted) => evicted,
            Err(e) => {
                // An untracked record would escape the cap and bulk revocation.
                if let Err(cleanup) = self.cache.delete(&record_key).await {
                    warn!(jti = %jti, error = %cleanup, "Failed to drop untracked refresh token");
                }
                return Err(e);
            }
        };

        if !evicted.is_empty() {
            let evicted_keys: Vec<String> =
                evicted.iter().map(|j| keys::refresh_token(j)).collect();
            self.cache.delete_many(&evicted_keys).await?;
            debug!(
                user_id = %user.id,
                evicted = evicted.len(),
                "Evicted oldest refresh tokens over the per-user cap"
            );
        }

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_in: access.claims.remaining_ttl_seconds(),
            token_type: "Bearer".to_string(),
        })
    }

    /// Redeem a refresh token for a new pair. The presented token is
    /// consumed whether or not the rest of the exchange succeeds.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let claims = self
            .decoder
            .decode_refresh_token(refresh_token)
            .map_err(|_| AppError::authentication(INVALID_REFRESH))?;

        let raw = self
            .cache
            .get_del(&keys::refresh_token(&claims.jti))
            .await?
            .ok_or_else(|| AppError::authentication(INVALID_REFRESH))?;
        self.cache
            .list_remove(&keys::user_refresh_tokens(claims.sub), &claims.jti)
            .await?;

        let record: RefreshTokenRecord = serde_json::from_str(&raw)?;
        if record.user_id != claims.sub {
            warn!(jti = %claims.jti, "Refresh token record does not match its subject");
            return Err(AppError::authentication(INVALID_REFRESH));
        }

        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .filter(User::is_active)
            .ok_or_else(|| AppError::authentication(INVALID_REFRESH))?;

        debug!(user_id = %user.id, "Rotated refresh token");
        self.issue_token_pair(&user).await
    }

    /// Revoke every refresh token of a user.
    pub async fn invalidate_all_user_tokens(&self, user_id: UserId) -> AppResult<u64> {
        let list_key = keys::user_refresh_tokens(user_id);
        let jtis = self.cache.list_range(&list_key).await?;

        let mut doomed: Vec<String> = jtis.iter().map(|j| keys::refresh_token(j)).collect();
        doomed.push(list_key);
        self.cache.delete_many(&doomed).await?;

        info!(user_id = %user_id, revoked = jtis.len(), "Revoked all refresh tokens");
        Ok(jtis.len() as u64)
    }

    /// Revoke a single refresh token (one-device logout). The token must
    /// belong to `owner`.
    pub async fn invalidate_one(&self, owner: UserId, refresh_token: &str) -> AppResult<()> {
        let claims = self
            .decoder
            .decode_refresh_token(refresh_token)
            .map_err(|_| AppError::authentication(INVALID_REFRESH))?;
        if claims.sub != owner {
            warn!(
                user_id = %owner,
                token_owner = %claims.sub,
                "Refused to revoke another user's refresh token"
            );
            return Err(AppError::authentication(INVALID_REFRESH));
        }

        self.cache.delete(&keys::refresh_token(&claims.jti)).await?;
        self.cache
            .list_remove(&keys::user_refresh_tokens(claims.sub), &claims.jti)
            .await?;
        debug!(user_id = %claims.sub, "Revoked refresh token");
        Ok(())
    }

    /// Check an access token's signature, claims and expiry.
    pub fn verify_access(&self, access_token: &str) -> Result<Claims, TokenRejection> {
        self.decoder.decode_access_token(access_token)
    }

    /// Live refresh-token jtis of a user, oldest first.
    pub async fn active_refresh_tokens(&self, user_id: UserId) -> AppResult<Vec<String>> {
        self.cache
            .list_range(&keys::user_refresh_tokens(user_id))
            .await
    }
}
