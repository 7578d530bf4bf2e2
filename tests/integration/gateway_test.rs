//! Integration tests for presence through the gateway, with accounts and
//! sessions created over HTTP.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::mpsc;

use chorus_entity::presence::PresenceStatus;
use chorus_realtime::connection::ConnectionHandle;
use chorus_realtime::message::OutboundMessage;

use crate::helpers::{TestApp, drain};

struct Client {
    handle: Arc<ConnectionHandle>,
    rx: mpsc::Receiver<OutboundMessage>,
}

impl Client {
    async fn open(app: &TestApp, username: &str) -> Self {
        let user = app.register(username).await;
        Self::attach(app, &user).await
    }

    async fn attach(app: &TestApp, user: &crate::helpers::TestUser) -> Self {
        let (handle, mut rx) = app.connect(user, "test-agent").await;
        drain(&mut rx);
        Self { handle, rx }
    }

    /// Send a frame with a request id and return the ack data.
    async fn call(&mut self, app: &TestApp, event: &str, data: Value) -> Value {
        let frame = json!({ "event": event, "data": data, "request_id": "r" });
        app.state
            .realtime
            .gateway
            .handle_frame(self.handle.id, &frame.to_string())
            .await;
        let ack = drain(&mut self.rx).into_iter().find_map(|f| match f {
            OutboundMessage::Ack { success, data, message, .. } => Some((success, data, message)),
            _ => None,
        });
        match ack {
            Some((true, data, _)) => data.unwrap_or(Value::Null),
            other => panic!("{event} failed: {other:?}"),
        }
    }

    fn presence(&mut self) -> Vec<(String, PresenceStatus)> {
        drain(&mut self.rx)
            .into_iter()
            .filter_map(|f| match f {
                OutboundMessage::Presence { username, status, .. } => Some((username, status)),
                _ => None,
            })
            .collect()
    }

    fn events(&mut self) -> Vec<String> {
        drain(&mut self.rx)
            .into_iter()
            .filter_map(|f| match f {
                OutboundMessage::Event { event, .. } => Some(event),
                _ => None,
            })
            .collect()
    }
}

#[tokio::test]
async fn test_online_offline_is_per_user_not_per_tab() {
    let app = TestApp::new().await;
    let mut alice = Client::open(&app, "alice").await;
    let bob = app.register("bob").await;

    let tab1 = Client::attach(&app, &bob).await;
    assert_eq!(alice.presence(), [("bob".to_string(), PresenceStatus::Online)]);

    let tab2 = Client::attach(&app, &bob).await;
    assert!(alice.presence().is_empty());
    assert!(app.state.realtime.online.is_online(tab1.handle.user_id));

    let gateway = &app.state.realtime.gateway;
    gateway.disconnect(tab1.handle.id, "client_disconnect").await;
    assert!(alice.presence().is_empty());

    gateway.disconnect(tab2.handle.id, "client_disconnect").await;
    assert_eq!(alice.presence(), [("bob".to_string(), PresenceStatus::Offline)]);
    assert!(!app.state.realtime.online.is_online(tab2.handle.user_id));
}

#[tokio::test]
async fn test_group_and_room_events_reach_members() {
    let app = TestApp::new().await;
    let mut owner = Client::open(&app, "carol").await;
    let mut guest = Client::open(&app, "dave").await;

    let group = owner.call(&app, "create_group", json!({ "name": "Guild" })).await;
    let group_id = group["group_id"].clone();
    let room = owner
        .call(
            &app,
            "create_room",
            json!({ "group_id": group_id, "name": "voice", "kind": "voice" }),
        )
        .await;
    let room_id = room["room_id"].clone();
    owner
        .call(&app, "join_room", json!({ "group_id": group_id, "room_id": room_id }))
        .await;
    drain(&mut owner.rx);

    guest.call(&app, "join_group", json!({ "group_id": group_id })).await;
    assert!(owner.events().contains(&"user_joined_group".to_string()));

    guest
        .call(&app, "join_room", json!({ "group_id": group_id, "room_id": room_id }))
        .await;
    assert!(owner.events().contains(&"user_joined_room".to_string()));

    app.state
        .realtime
        .gateway
        .disconnect(guest.handle.id, "client_disconnect")
        .await;
    let seen = owner.events();
    assert!(seen.contains(&"user_left_room".to_string()));
    assert!(seen.contains(&"user_left_group".to_string()));
}

#[tokio::test]
async fn test_disconnect_ends_session_and_clears_state() {
    let app = TestApp::new().await;
    let user = app.register("erin").await;
    let client = Client::attach(&app, &user).await;
    let engine = &app.state.realtime;

    assert_eq!(engine.pool.len(), 1);
    assert_eq!(app.state.sessions.count_active().await.unwrap(), 1);

    engine
        .gateway
        .disconnect(client.handle.id, "client_disconnect")
        .await;
    // A second teardown is a no-op.
    engine
        .gateway
        .disconnect(client.handle.id, "client_disconnect")
        .await;

    assert_eq!(engine.pool.len(), 0);
    assert_eq!(engine.online.count(), 0);
    assert_eq!(app.state.sessions.count_active().await.unwrap(), 0);
    assert!(!client.handle.is_alive());
}
