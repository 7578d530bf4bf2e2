//! Integration tests for session listing and revocation.

use axum::http::StatusCode;

use crate::helpers::{TestApp, disconnect_reason, drain};

#[tokio::test]
async fn test_sessions_follow_connections() {
    let app = TestApp::new().await;
    let user = app.register("alice").await;

    let empty = app
        .request("GET", "/auth/sessions", None, Some(&user.access_token))
        .await;
    assert_eq!(empty.status, StatusCode::OK);
    assert_eq!(empty.data().as_array().unwrap().len(), 0);

    let (laptop, _rx1) = app.connect(&user, "laptop").await;
    let (_phone, _rx2) = app.connect(&user, "phone").await;

    let listed = app
        .request("GET", "/auth/sessions", None, Some(&user.access_token))
        .await;
    let sessions = listed.data().as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|s| s["is_active"] == true));
    assert!(sessions.iter().all(|s| s["ip_address"] == "203.0.113.7"));
    assert!(sessions.iter().any(|s| s["user_agent"] == "laptop"));

    app.state
        .realtime
        .gateway
        .disconnect(laptop.id, "client_disconnect")
        .await;
    let after = app
        .request("GET", "/auth/sessions", None, Some(&user.access_token))
        .await;
    let remaining = after.data().as_array().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["user_agent"], "phone");
}

#[tokio::test]
async fn test_end_one_session_closes_its_socket() {
    let app = TestApp::new().await;
    let user = app.register("bob").await;
    let (laptop, mut laptop_rx) = app.connect(&user, "laptop").await;
    let (_phone, mut phone_rx) = app.connect(&user, "phone").await;
    drain(&mut laptop_rx);
    drain(&mut phone_rx);

    let response = app
        .request(
            "DELETE",
            &format!("/auth/sessions/{}", laptop.session_id),
            None,
            Some(&user.access_token),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data()["is_active"], false);
    assert!(response.data()["logout_time"].is_string());
    assert_eq!(
        disconnect_reason(&drain(&mut laptop_rx)).as_deref(),
        Some("session_ended")
    );
    assert_eq!(disconnect_reason(&drain(&mut phone_rx)), None);
    assert!(app.state.realtime.pool.get(laptop.id).is_none());
}

#[tokio::test]
async fn test_cannot_end_someone_elses_session() {
    let app = TestApp::new().await;
    let owner = app.register("carol").await;
    let intruder = app.register("dave").await;
    let (handle, _rx) = app.connect(&owner, "laptop").await;

    let response = app
        .request(
            "DELETE",
            &format!("/auth/sessions/{}", handle.session_id),
            None,
            Some(&intruder.access_token),
        )
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(handle.is_alive());
}

#[tokio::test]
async fn test_end_session_rejects_bad_id() {
    let app = TestApp::new().await;
    let user = app.register("erin").await;

    let response = app
        .request(
            "DELETE",
            "/auth/sessions/not-a-uuid",
            None,
            Some(&user.access_token),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.code(), "VALIDATION");
}

#[tokio::test]
async fn test_end_other_sessions_keeps_current() {
    let app = TestApp::new().await;
    let user = app.register("frank").await;
    let (current, mut current_rx) = app.connect(&user, "laptop").await;
    let (_a, mut a_rx) = app.connect(&user, "phone").await;
    let (_b, mut b_rx) = app.connect(&user, "tablet").await;
    drain(&mut current_rx);

    let response = app
        .request(
            "DELETE",
            &format!("/auth/sessions?current={}", current.session_id),
            None,
            Some(&user.access_token),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data()["ended"], 2);
    assert_eq!(response.data()["disconnected"], 2);
    assert_eq!(disconnect_reason(&drain(&mut a_rx)).as_deref(), Some("session_ended"));
    assert_eq!(disconnect_reason(&drain(&mut b_rx)).as_deref(), Some("session_ended"));
    assert_eq!(disconnect_reason(&drain(&mut current_rx)), None);

    let listed = app
        .request("GET", "/auth/sessions", None, Some(&user.access_token))
        .await;
    let sessions = listed.data().as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["id"], current.session_id.to_string());
}

#[tokio::test]
async fn test_sessions_require_authentication() {
    let app = TestApp::new().await;

    let missing = app.request("GET", "/auth/sessions", None, None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

    let forged = app
        .request("GET", "/auth/sessions", None, Some("not.a.jwt"))
        .await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
    assert_eq!(forged.body["message"], "invalid token");
}
