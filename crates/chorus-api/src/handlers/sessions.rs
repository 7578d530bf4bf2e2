//! Session listing and revocation for the calling user.

use axum::Json;
use axum::extract::{Path, Query, State};

use chorus_core::error::AppError;
use chorus_core::types::{ApiResponse, SessionId};

use crate::dto::request::EndOtherSessionsQuery;
use crate::dto::response::{EndedSessionsResponse, SessionResponse};
use crate::error::ApiError;
use crate::extractors::AuthUser;
use crate::state::AppState;

fn parse_session_id(raw: &str) -> Result<SessionId, AppError> {
    raw.parse()
        .map_err(|_| AppError::validation("Invalid session id"))
}

/// GET /auth/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<SessionResponse>>>, ApiError> {
    let sessions = state.sessions.list_active_for_user(auth.user_id()).await?;
    Ok(Json(ApiResponse::ok(
        sessions.into_iter().map(SessionResponse::from).collect(),
    )))
}

/// DELETE /auth/sessions/{id}
pub async fn end_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SessionResponse>>, ApiError> {
    let session_id = parse_session_id(&id)?;
    let ended = state
        .sessions
        .end_session_for_user(auth.user_id(), session_id)
        .await?;
    state
        .realtime
        .gateway
        .disconnect_sessions(std::slice::from_ref(&ended), "session_ended")
        .await;
    Ok(Json(ApiResponse::ok(SessionResponse::from(ended))))
}

/// DELETE /auth/sessions?current={id}
///
/// Ends every session of the caller except `current`.
pub async fn end_other_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<EndOtherSessionsQuery>,
) -> Result<Json<ApiResponse<EndedSessionsResponse>>, ApiError> {
    let keep = query
        .current
        .as_deref()
        .map(parse_session_id)
        .transpose()?;
    let ended = state
        .sessions
        .end_other_sessions(auth.user_id(), keep)
        .await?;
    let disconnected = state
        .realtime
        .gateway
        .disconnect_sessions(&ended, "session_ended")
        .await;
    Ok(Json(ApiResponse::ok(EndedSessionsResponse {
        ended: ended.len(),
        disconnected,
    })))
}
