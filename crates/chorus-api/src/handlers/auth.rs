//! Auth handlers: register, login, refresh, logout, change password.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::info;

use chorus_auth::account::RegisterInput;
use chorus_core::types::ApiResponse;
use chorus_entity::session::TokenPair;

use crate::dto::request::{
    ChangePasswordRequest, LoginRequest, LogoutRequest, RefreshRequest, RegisterRequest,
};
use crate::dto::response::{AuthResponse, EndedSessionsResponse, MessageResponse, UserResponse};
use crate::error::ApiError;
use crate::extractors::{AuthUser, ValidatedJson};
use crate::state::AppState;

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), ApiError> {
    let outcome = state
        .accounts
        .register(RegisterInput {
            username: req.username,
            email: req.email,
            password: req.password,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(AuthResponse {
            user: UserResponse::from(&outcome.user),
            tokens: outcome.tokens,
        })),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    let outcome = state.accounts.login(&req.username, &req.password).await?;

    Ok(Json(ApiResponse::ok(AuthResponse {
        user: UserResponse::from(&outcome.user),
        tokens: outcome.tokens,
    })))
}

/// POST /auth/refresh-token
pub async fn refresh_token(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<Json<ApiResponse<TokenPair>>, ApiError> {
    let tokens = state.tokens.refresh(&req.refresh_token).await?;
    Ok(Json(ApiResponse::ok(tokens)))
}

/// POST /auth/logout
///
/// Revokes the presented refresh token, which must belong to the caller.
/// With `all_devices`, also revokes
/// every other refresh token, ends every session and closes live sockets.
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<LogoutRequest>,
) -> Result<Json<ApiResponse<EndedSessionsResponse>>, ApiError> {
    if !req.all_devices {
        state
            .accounts
            .logout(auth.user_id(), &req.refresh_token)
            .await?;
        return Ok(Json(ApiResponse::ok(EndedSessionsResponse {
            ended: 0,
            disconnected: 0,
        })));
    }

    let ended = state.accounts.logout_all(auth.user_id()).await?;
    let disconnected = state
        .realtime
        .gateway
        .disconnect_sessions(&ended, "logged_out")
        .await;
    Ok(Json(ApiResponse::ok(EndedSessionsResponse {
        ended: ended.len(),
        disconnected,
    })))
}

/// POST /auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let ended = state
        .accounts
        .change_password(auth.user_id(), &req.current_password, &req.new_password)
        .await?;
    let disconnected = state
        .realtime
        .gateway
        .disconnect_sessions(&ended, "password_changed")
        .await;

    info!(
        user_id = %auth.user_id(),
        sessions = ended.len(),
        disconnected,
        "Password changed, sessions ended"
    );
    Ok(Json(ApiResponse::ok(MessageResponse::new(
        "Password changed. Please log in again.",
    ))))
}
