//! Integration tests for the authentication flow.

use axum::http::StatusCode;
use serde_json::json;

use crate::helpers::{PASSWORD, TestApp, disconnect_reason, drain};

#[tokio::test]
async fn test_register_returns_user_and_tokens() {
    let app = TestApp::new().await;

    let response = app
        .request(
            "POST",
            "/auth/register",
            Some(json!({
                "username": "alice",
                "email": "Alice@Example.com",
                "password": PASSWORD,
            })),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["success"], true);
    let data = response.data();
    assert_eq!(data["user"]["username"], "alice");
    assert_eq!(data["user"]["email"], "alice@example.com");
    assert_eq!(data["user"]["role"], "member");
    assert_eq!(data["token_type"], "Bearer");
    assert!(data["access_token"].is_string());
    assert!(data["refresh_token"].is_string());
    assert!(data["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_register_duplicate_is_conflict() {
    let app = TestApp::new().await;
    app.register("bob").await;

    let response = app
        .request(
            "POST",
            "/auth/register",
            Some(json!({
                "username": "BOB",
                "email": "other@example.com",
                "password": PASSWORD,
            })),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.code(), "CONFLICT");
}

#[tokio::test]
async fn test_register_rejects_bad_input() {
    let app = TestApp::new().await;

    for body in [
        json!({ "username": "x", "email": "x@example.com", "password": PASSWORD }),
        json!({ "username": "bad name!", "email": "y@example.com", "password": PASSWORD }),
        json!({ "username": "carol", "email": "not-an-email", "password": PASSWORD }),
        json!({ "username": "carol", "email": "carol@example.com", "password": "password" }),
        json!({ "username": "carol" }),
    ] {
        let response = app.request("POST", "/auth/register", Some(body), None).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{:?}", response.body);
        assert_eq!(response.code(), "VALIDATION");
    }
}

#[tokio::test]
async fn test_login_by_username_or_email() {
    let app = TestApp::new().await;
    app.register("dave").await;

    for identifier in ["dave", "dave@example.com"] {
        let response = app
            .request(
                "POST",
                "/auth/login",
                Some(json!({ "username": identifier, "password": PASSWORD })),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.data()["user"]["username"], "dave");
        assert!(response.data()["user"]["last_login_at"].is_string());
    }
}

#[tokio::test]
async fn test_login_failures_look_the_same() {
    let app = TestApp::new().await;
    app.register("erin").await;

    let wrong_password = app
        .request(
            "POST",
            "/auth/login",
            Some(json!({ "username": "erin", "password": "wrong-password-123" })),
            None,
        )
        .await;
    let unknown_user = app
        .request(
            "POST",
            "/auth/login",
            Some(json!({ "username": "nobody", "password": PASSWORD })),
            None,
        )
        .await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.body, unknown_user.body);
    assert_eq!(wrong_password.code(), "AUTHENTICATION");
}

#[tokio::test]
async fn test_refresh_rotates_and_consumes() {
    let app = TestApp::new().await;
    let user = app.register("frank").await;

    let first = app
        .request(
            "POST",
            "/auth/refresh-token",
            Some(json!({ "refresh_token": user.refresh_token })),
            None,
        )
        .await;
    assert_eq!(first.status, StatusCode::OK);
    let rotated = first.data()["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(rotated, user.refresh_token);

    let replay = app
        .request(
            "POST",
            "/auth/refresh-token",
            Some(json!({ "refresh_token": user.refresh_token })),
            None,
        )
        .await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);

    let second = app
        .request(
            "POST",
            "/auth/refresh-token",
            Some(json!({ "refresh_token": rotated })),
            None,
        )
        .await;
    assert_eq!(second.status, StatusCode::OK);
}

#[tokio::test]
async fn test_access_token_is_not_a_refresh_token() {
    let app = TestApp::new().await;
    let user = app.register("grace").await;

    let response = app
        .request(
            "POST",
            "/auth/refresh-token",
            Some(json!({ "refresh_token": user.access_token })),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_only_this_device() {
    let app = TestApp::new().await;
    let user = app.register("heidi").await;
    let other_device = app
        .request(
            "POST",
            "/auth/login",
            Some(json!({ "username": "heidi", "password": PASSWORD })),
            None,
        )
        .await;
    let other_refresh = other_device.data()["refresh_token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request(
            "POST",
            "/auth/logout",
            Some(json!({ "refresh_token": user.refresh_token })),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let revoked = app
        .request(
            "POST",
            "/auth/refresh-token",
            Some(json!({ "refresh_token": user.refresh_token })),
            None,
        )
        .await;
    assert_eq!(revoked.status, StatusCode::UNAUTHORIZED);

    let still_valid = app
        .request(
            "POST",
            "/auth/refresh-token",
            Some(json!({ "refresh_token": other_refresh })),
            None,
        )
        .await;
    assert_eq!(still_valid.status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_all_devices_closes_sockets() {
    let app = TestApp::new().await;
    let user = app.register("ivan").await;
    let (_handle, mut rx) = app.connect(&user, "laptop").await;

    let response = app
        .request(
            "POST",
            "/auth/logout",
            Some(json!({ "refresh_token": user.refresh_token, "all_devices": true })),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data()["ended"], 1);
    assert_eq!(response.data()["disconnected"], 1);
    assert_eq!(disconnect_reason(&drain(&mut rx)).as_deref(), Some("logged_out"));
    assert_eq!(app.state.realtime.pool.len(), 0);
}

#[tokio::test]
async fn test_logout_requires_access_token() {
    let app = TestApp::new().await;
    let user = app.register("judy").await;

    let response = app
        .request(
            "POST",
            "/auth/logout",
            Some(json!({ "refresh_token": user.refresh_token })),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["message"], "missing token");
}

#[tokio::test]
async fn test_logout_refuses_another_users_token() {
    let app = TestApp::new().await;
    let victim = app.register("kate").await;
    let caller = app.register("leon").await;

    let response = app
        .request(
            "POST",
            "/auth/logout",
            Some(json!({ "refresh_token": victim.refresh_token })),
            Some(&caller.access_token),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), "AUTHENTICATION");

    let still_valid = app
        .request(
            "POST",
            "/auth/refresh-token",
            Some(json!({ "refresh_token": victim.refresh_token })),
            None,
        )
        .await;
    assert_eq!(still_valid.status, StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_ends_everything() {
    let app = TestApp::new().await;
    let user = app.register("mallory").await;
    let (_handle, mut rx) = app.connect(&user, "phone").await;
    let new_password = "Saffron-Quartz-Meadow-77";

    let wrong_current = app
        .request(
            "POST",
            "/auth/change-password",
            Some(json!({ "current_password": "nope-nope-nope", "new_password": new_password })),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(wrong_current.status, StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            "POST",
            "/auth/change-password",
            Some(json!({ "current_password": PASSWORD, "new_password": new_password })),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        disconnect_reason(&drain(&mut rx)).as_deref(),
        Some("password_changed")
    );

    let refresh = app
        .request(
            "POST",
            "/auth/refresh-token",
            Some(json!({ "refresh_token": user.refresh_token })),
            None,
        )
        .await;
    assert_eq!(refresh.status, StatusCode::UNAUTHORIZED);

    let old_login = app
        .request(
            "POST",
            "/auth/login",
            Some(json!({ "username": "mallory", "password": PASSWORD })),
            None,
        )
        .await;
    assert_eq!(old_login.status, StatusCode::UNAUTHORIZED);

    let new_login = app
        .request(
            "POST",
            "/auth/login",
            Some(json!({ "username": "mallory", "password": new_password })),
            None,
        )
        .await;
    assert_eq!(new_login.status, StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_json_is_validation_error() {
    let app = TestApp::new().await;
    let response = app
        .request("POST", "/auth/login", Some(json!("just a string")), None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.code(), "VALIDATION");
}
