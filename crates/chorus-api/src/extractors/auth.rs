//! `AuthUser` extractor: validates the bearer access token.

use axum::RequestPartsExt;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;

use chorus_auth::{Claims, TokenRejection};
use chorus_core::error::AppError;
use chorus_core::types::UserId;

use crate::error::ApiError;
use crate::state::AppState;

/// The caller of an authenticated route.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn user_id(&self) -> UserId {
        self.0.sub
    }

    pub fn claims(&self) -> &Claims {
        &self.0
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::from(TokenRejection::Missing))?;

        let claims = state
            .tokens
            .verify_access(bearer.token())
            .map_err(AppError::from)?;
        Ok(Self(claims))
    }
}
