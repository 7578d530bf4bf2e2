//! Integration tests for the health endpoint.

use axum::http::StatusCode;

use crate::helpers::TestApp;

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;

    let response = app.request("GET", "/health", None, None).await;

    assert_eq!(response.status, StatusCode::OK);
    let data = response.data();
    assert_eq!(data["status"], "ok");
    assert_eq!(data["cache"], true);
    assert!(data["database"].is_null());
    assert_eq!(data["fanout_degraded"], false);
    assert!(data["node_id"].as_str().unwrap().starts_with("node-"));
}

#[tokio::test]
async fn test_health_counts_connections() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;
    let (_tab1, _rx1) = app.connect(&alice, "tab-1").await;
    let (_tab2, _rx2) = app.connect(&alice, "tab-2").await;

    let response = app.request("GET", "/health", None, None).await;

    assert_eq!(response.data()["connections"], 2);
    assert_eq!(response.data()["online_users"], 1);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = TestApp::new().await;
    let response = app.request("GET", "/nope", None, None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
