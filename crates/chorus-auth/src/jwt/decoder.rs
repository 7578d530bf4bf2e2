//! JWT token validation.

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use chorus_core::config::auth::AuthConfig;
use chorus_core::error::AppError;

use super::claims::{Claims, TokenType};

/// Why a presented token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenRejection {
    #[error("missing token")]
    Missing,
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
}

impl TokenRejection {
    /// Reason string sent to clients whose handshake is rejected.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Missing => "missing token",
            Self::Invalid => "invalid token",
            Self::Expired => "token expired",
        }
    }
}

impl From<TokenRejection> for AppError {
    fn from(rejection: TokenRejection) -> Self {
        AppError::authentication(rejection.reason())
    }
}

/// Validates signature, algorithm, issuer, audience and expiry.
#[derive(Clone)]
pub struct JwtDecoder {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtDecoder")
            .field("validation", &self.validation)
            .finish()
    }
}

impl JwtDecoder {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = config.leeway_seconds;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }

    pub fn decode_access_token(&self, token: &str) -> Result<Claims, TokenRejection> {
        self.decode_typed(token, TokenType::Access)
    }

    pub fn decode_refresh_token(&self, token: &str) -> Result<Claims, TokenRejection> {
        self.decode_typed(token, TokenType::Refresh)
    }

    fn decode_typed(&self, token: &str, expected: TokenType) -> Result<Claims, TokenRejection> {
        if token.trim().is_empty() {
            return Err(TokenRejection::Missing);
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                JwtErrorKind::ExpiredSignature => TokenRejection::Expired,
                _ => TokenRejection::Invalid,
            }
        })?;

        if data.claims.token_type != expected {
            return Err(TokenRejection::Invalid);
        }
        Ok(data.claims)
    }
}
