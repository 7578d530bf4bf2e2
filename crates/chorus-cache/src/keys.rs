//! Cache key builders for every entry Chorus writes.
//!
//! Providers add the deployment prefix; these are the logical names.

use chorus_core::types::{ConnectionId, SessionId, UserId};

// ── Token keys ─────────────────────────────────────────────

/// Record making a refresh token redeemable.
pub fn refresh_token(jti: &str) -> String {
    format!("refresh_token:{jti}")
}

/// Ordered list of a user's live refresh-token jtis, oldest first.
pub fn user_refresh_tokens(user_id: UserId) -> String {
    format!("user_refresh_tokens:{user_id}")
}

// ── Session mirror keys ────────────────────────────────────

/// connectionId → sessionId.
pub fn session_by_socket(connection_id: ConnectionId) -> String {
    format!("sessions:socket:{connection_id}")
}

/// userId → {sessionId, connectionId} of the user's latest session.
pub fn session_by_user(user_id: UserId) -> String {
    format!("sessions:user:{user_id}")
}

/// sessionId → session snapshot.
pub fn session_details(session_id: SessionId) -> String {
    format!("sessions:details:{session_id}")
}

/// Pattern matching every session snapshot key.
pub fn session_details_pattern() -> &'static str {
    "sessions:details:*"
}

/// Extract the session id from a snapshot key.
pub fn session_id_from_details_key(key: &str) -> Option<SessionId> {
    key.strip_prefix("sessions:details:")?.parse().ok()
}

// ── Presence keys ──────────────────────────────────────────

/// Number of processes on which the user has at least one live connection.
pub fn user_online_nodes(user_id: UserId) -> String {
    format!("presence:online:{user_id}")
}
