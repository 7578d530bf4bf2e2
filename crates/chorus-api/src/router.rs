//! Route definitions.

use axum::Router;
use axum::routing::{delete, get, post};

use crate::handlers;
use crate::state::AppState;

/// Build the router with every route, bound to `state`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(auth_routes())
        .merge(session_routes())
        .route("/ws", get(handlers::ws::ws_upgrade))
        .route("/health", get(handlers::health::health))
        .with_state(state)
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh-token", post(handlers::auth::refresh_token))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/change-password", post(handlers::auth::change_password))
}

fn session_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/auth/sessions",
            get(handlers::sessions::list_sessions).delete(handlers::sessions::end_other_sessions),
        )
        .route("/auth/sessions/{id}", delete(handlers::sessions::end_session))
}
