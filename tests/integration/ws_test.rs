//! Integration tests for the WebSocket transport over a real socket.

use std::time::Duration;

use axum::http::StatusCode;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

use crate::helpers::TestApp;

type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Next JSON text frame, skipping pings.
async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("Timed out waiting for a frame")
            .expect("Socket closed")
            .expect("Socket error");
        if let Message::Text(text) = frame {
            let value: Value = serde_json::from_str(text.as_str()).expect("Invalid JSON frame");
            if value["type"] != "ping" {
                return value;
            }
        }
    }
}

/// Read frames until one of `kind` arrives.
async fn wait_for(socket: &mut Socket, kind: &str) -> Value {
    loop {
        let frame = next_json(socket).await;
        if frame["type"] == kind {
            return frame;
        }
    }
}

#[tokio::test]
async fn test_ws_upgrade_without_token() {
    let app = TestApp::new().await;
    let addr = app.spawn_server().await;

    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect_err("Handshake should be refused");
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_ws_connect_with_query_token_and_ack() {
    let app = TestApp::new().await;
    let user = app.register("alice").await;
    let addr = app.spawn_server().await;

    let (mut socket, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token={}", user.access_token))
            .await
            .expect("Handshake failed");

    let connected = next_json(&mut socket).await;
    assert_eq!(connected["type"], "connected");
    assert_eq!(connected["username"], "alice");
    assert_eq!(connected["user_id"], user.id);

    socket
        .send(Message::Text(
            json!({ "event": "create_group", "data": { "name": "Guild" }, "request_id": "r1" })
                .to_string()
                .into(),
        ))
        .await
        .unwrap();
    let ack = wait_for(&mut socket, "ack").await;
    assert_eq!(ack["request_id"], "r1");
    assert_eq!(ack["success"], true);
    assert_eq!(ack["data"]["name"], "Guild");

    socket
        .send(Message::Text(r#"{"event":"join_group","data":{},"request_id":"r2"}"#.into()))
        .await
        .unwrap();
    let rejected = wait_for(&mut socket, "ack").await;
    assert_eq!(rejected["success"], false);
    assert_eq!(rejected["code"], "VALIDATION");
}

#[tokio::test]
async fn test_ws_bearer_header_and_server_side_revocation() {
    let app = TestApp::new().await;
    let user = app.register("bob").await;
    let addr = app.spawn_server().await;

    let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
    request.headers_mut().insert(
        "authorization",
        format!("Bearer {}", user.access_token).parse().unwrap(),
    );
    let (mut socket, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("Handshake failed");
    wait_for(&mut socket, "connected").await;

    let listed = app
        .request("GET", "/auth/sessions", None, Some(&user.access_token))
        .await;
    let session_id = listed.data()[0]["id"].as_str().unwrap().to_string();

    let ended = app
        .request(
            "DELETE",
            &format!("/auth/sessions/{session_id}"),
            None,
            Some(&user.access_token),
        )
        .await;
    assert_eq!(ended.status, StatusCode::OK);

    let notice = wait_for(&mut socket, "force_disconnect").await;
    assert_eq!(notice["reason"], "session_ended");
}

#[tokio::test]
async fn test_ws_client_close_ends_session() {
    let app = TestApp::new().await;
    let user = app.register("carol").await;
    let addr = app.spawn_server().await;

    let (mut socket, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws?auth={}", user.access_token))
            .await
            .expect("Handshake failed");
    wait_for(&mut socket, "connected").await;
    assert_eq!(app.state.sessions.count_active().await.unwrap(), 1);

    socket.close(None).await.unwrap();

    let mut remaining = 1;
    for _ in 0..50 {
        remaining = app.state.sessions.count_active().await.unwrap();
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remaining, 0);
    assert_eq!(app.state.realtime.pool.len(), 0);
}
