//! Shared test helpers for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use chorus_api::{AppState, build_app};
use chorus_core::config::AppConfig;
use chorus_realtime::connection::ConnectionHandle;
use chorus_realtime::gateway::ClientInfo;
use chorus_realtime::message::OutboundMessage;

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const PASSWORD: &str = "Glacier-Lantern-Orbit-42";

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Shared services, for assertions and for opening sockets in-process
    pub state: AppState,
}

/// A decoded response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestResponse {
    /// The `data` field of a success envelope.
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    /// The `code` field of an error envelope.
    pub fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }
}

/// Tokens of a registered user.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl TestApp {
    /// Create a new test application
    pub async fn new() -> Self {
        Self::with_config(AppConfig::in_memory(SECRET)).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let state = AppState::build(config)
            .await
            .expect("Failed to build app state");
        let router = build_app(state.clone());
        Self { router, state }
    }

    /// Send a request through the router without a socket.
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }

    /// Register `username` with [`PASSWORD`].
    pub async fn register(&self, username: &str) -> TestUser {
        let response = self
            .request(
                "POST",
                "/auth/register",
                Some(serde_json::json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": PASSWORD,
                })),
                None,
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "register failed: {:?}",
            response.body
        );
        let data = response.data();
        TestUser {
            id: data["user"]["id"].as_str().unwrap().to_string(),
            access_token: data["access_token"].as_str().unwrap().to_string(),
            refresh_token: data["refresh_token"].as_str().unwrap().to_string(),
        }
    }

    /// Open a socket in-process, as the WebSocket handler would.
    pub async fn connect(
        &self,
        user: &TestUser,
        user_agent: &str,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let gateway = &self.state.realtime.gateway;
        let claims = gateway
            .authenticate(Some(&user.access_token))
            .expect("Access token rejected");
        gateway
            .handshake(
                claims,
                ClientInfo {
                    user_agent: Some(user_agent.to_string()),
                    ip_address: Some("203.0.113.7".to_string()),
                },
            )
            .await
            .expect("Handshake failed")
    }

    /// Serve the app on an ephemeral local port.
    pub async fn spawn_server(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("No local addr");
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server failed");
        });
        addr
    }
}

/// Drain every frame currently queued on a connection.
pub fn drain(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<OutboundMessage> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

/// The reason of the force_disconnect frame among `frames`, if any.
pub fn disconnect_reason(frames: &[OutboundMessage]) -> Option<String> {
    frames.iter().find_map(|f| match f {
        OutboundMessage::ForceDisconnect { reason } => Some(reason.clone()),
        _ => None,
    })
}
