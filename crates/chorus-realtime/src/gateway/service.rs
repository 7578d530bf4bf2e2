//! Gateway: wires tokens, sessions, presence and fanout around each socket.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use chorus_auth::{Claims, SessionRegistry, TokenRejection, TokenService};
use chorus_core::config::realtime::RealtimeConfig;
use chorus_core::config::session::SessionConfig;
use chorus_core::error::{AppError, ErrorKind};
use chorus_core::result::AppResult;
use chorus_core::types::{ConnectionId, GroupId, RoomId, UserId};
use chorus_entity::presence::{Connection, PresenceStatus, room_broadcast_key};
use chorus_entity::session::Session;

use super::events::{
    BUILTIN_EVENTS, CreateGroup, CreateRoom, GroupTarget, RenameRoom, RoomTarget, ScreenShare,
};
use super::handler::{EventContext, EventHandler};
use crate::channel::{ChannelRegistry, PRESENCE_KEY};
use crate::connection::{ConnectionHandle, ConnectionPool, HeartbeatConfig};
use crate::fanout::FanoutAdapter;
use crate::message::{InboundFrame, OutboundMessage};
use crate::metrics::{RealtimeMetrics, RealtimeMetricsSnapshot};
use crate::presence::{AvUpdate, OnlineTracker, PlacementChange, PresenceStore};

/// Client details recorded on the session.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Everything the gateway coordinates.
pub struct GatewayComponents {
    pub tokens: Arc<TokenService>,
    pub sessions: Arc<SessionRegistry>,
    pub pool: Arc<ConnectionPool>,
    pub channels: Arc<ChannelRegistry>,
    pub presence: Arc<dyn PresenceStore>,
    pub online: Arc<OnlineTracker>,
    pub fanout: Arc<FanoutAdapter>,
    pub metrics: Arc<RealtimeMetrics>,
}

/// Owns the connect/disconnect lifecycle of this process's sockets.
///
/// The transport layer calls [`Gateway::authenticate`] before accepting a
/// socket, [`Gateway::handshake`] once accepted, [`Gateway::handle_frame`] for
/// every inbound text frame and [`Gateway::disconnect`] when the socket goes
/// away. Every failure inside a frame is turned into a reply to that frame.
pub struct Gateway {
    tokens: Arc<TokenService>,
    sessions: Arc<SessionRegistry>,
    pool: Arc<ConnectionPool>,
    channels: Arc<ChannelRegistry>,
    presence: Arc<dyn PresenceStore>,
    online: Arc<OnlineTracker>,
    fanout: Arc<FanoutAdapter>,
    metrics: Arc<RealtimeMetrics>,
    handlers: DashMap<String, Arc<dyn EventHandler>>,
    outbound_buffer: usize,
    heartbeat: HeartbeatConfig,
    touch_interval: Duration,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("connections", &self.pool.len())
            .field("handlers", &self.handlers.len())
            .field("heartbeat", &self.heartbeat)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    pub fn new(
        parts: GatewayComponents,
        realtime: &RealtimeConfig,
        session: &SessionConfig,
    ) -> Self {
        Self {
            tokens: parts.tokens,
            sessions: parts.sessions,
            pool: parts.pool,
            channels: parts.channels,
            presence: parts.presence,
            online: parts.online,
            fanout: parts.fanout,
            metrics: parts.metrics,
            handlers: DashMap::new(),
            outbound_buffer: realtime.outbound_buffer_size.max(1),
            heartbeat: HeartbeatConfig {
                interval: Duration::from_secs(realtime.heartbeat_interval_seconds.max(1)),
                timeout: Duration::from_secs(realtime.heartbeat_timeout_seconds),
            },
            touch_interval: Duration::from_secs(session.activity_touch_interval_seconds),
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn presence(&self) -> &Arc<dyn PresenceStore> {
        &self.presence
    }

    pub fn online(&self) -> &Arc<OnlineTracker> {
        &self.online
    }

    pub fn fanout(&self) -> &Arc<FanoutAdapter> {
        &self.fanout
    }

    pub fn heartbeat_config(&self) -> HeartbeatConfig {
        self.heartbeat
    }

    /// Register a handler for an event the gateway does not handle itself.
    pub fn register_handler(
        &self,
        event: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> AppResult<()> {
        let event = event.into();
        if BUILTIN_EVENTS.contains(&event.as_str()) {
            return Err(AppError::configuration(format!(
                "Event '{event}' is handled by the gateway"
            )));
        }
        debug!(event = %event, "Registered event handler");
        self.handlers.insert(event, handler);
        Ok(())
    }

    /// Validate the access token offered at handshake. Nothing is created.
    pub fn authenticate(&self, token: Option<&str>) -> Result<Claims, TokenRejection> {
        let result = match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => self.tokens.verify_access(token),
            None => Err(TokenRejection::Missing),
        };
        if let Err(rejection) = &result {
            self.metrics.record_rejected();
            debug!(reason = rejection.reason(), "Handshake rejected");
        }
        result
    }

    /// Accept an authenticated socket.
    ///
    /// The session is written first; if that fails the socket is refused and
    /// no connection state exists. Returns the handle and the receiver the
    /// transport drains into the socket.
    pub async fn handshake(
        &self,
        claims: Claims,
        client: ClientInfo,
    ) -> AppResult<(Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>)> {
        let connection_id = ConnectionId::new();
        let user_id = claims.sub;

        let session = match self
            .sessions
            .create_session(user_id, connection_id, client.user_agent, client.ip_address)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.metrics.record_rejected();
                error!(user_id = %user_id, error = %e, "Failed to create session, refusing connection");
                return Err(e);
            }
        };

        let mut record = Connection::new(connection_id, user_id, claims.username.clone());
        record.session_id = Some(session.id);
        if let Err(e) = self.presence.register_connection(record).await {
            error!(user_id = %user_id, error = %e, "Failed to register presence, refusing connection");
            if let Err(end_err) = self.sessions.end_session_by_id(session.id).await {
                warn!(session_id = %session.id, error = %end_err, "Failed to end refused session");
            }
            self.metrics.record_rejected();
            return Err(e);
        }

        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        let handle = Arc::new(ConnectionHandle::new(
            connection_id,
            user_id,
            claims.username.clone(),
            claims.role,
            session.id,
            tx,
        ));
        handle.record_seen();
        self.pool.add(handle.clone());
        self.channels.subscribe(PRESENCE_KEY, connection_id);
        self.metrics.record_connect();

        handle.send(OutboundMessage::Connected {
            connection_id,
            user_id,
            username: claims.username.clone(),
        });

        if self.online.connect(user_id, &claims.username).await {
            self.fanout
                .broadcast(
                    PRESENCE_KEY,
                    OutboundMessage::Presence {
                        user_id,
                        username: claims.username.clone(),
                        status: PresenceStatus::Online,
                    },
                )
                .await;
        }

        info!(
            connection_id = %connection_id,
            user_id = %user_id,
            session_id = %session.id,
            "Connection established"
        );
        Ok((handle, rx))
    }

    /// Process one inbound text frame.
    pub async fn handle_frame(&self, connection_id: ConnectionId, raw: &str) {
        let Some(handle) = self.pool.get(connection_id) else {
            warn!(connection_id = %connection_id, "Frame from unknown connection");
            return;
        };
        handle.record_seen();
        self.metrics.record_frame();
        self.touch_activity(&handle).await;

        let frame: InboundFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                self.metrics.record_handler_error();
                handle.send(OutboundMessage::Error {
                    event: String::new(),
                    message: format!("Malformed frame: {e}"),
                    code: ErrorKind::Validation.to_string(),
                });
                return;
            }
        };
        if frame.event == "pong" {
            return;
        }

        let outcome = AssertUnwindSafe(self.dispatch(&handle, &frame))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(AppError::internal("Event handler panicked")));
        self.reply(&handle, &frame, outcome);
    }

    async fn touch_activity(&self, handle: &ConnectionHandle) {
        if !handle.claim_touch(self.touch_interval) {
            return;
        }
        if let Err(e) = self.sessions.touch(handle.session_id).await {
            warn!(
                connection_id = %handle.id,
                session_id = %handle.session_id,
                error = %e,
                "Failed to record session activity"
            );
        }
    }

    fn reply(&self, handle: &ConnectionHandle, frame: &InboundFrame, outcome: AppResult<Value>) {
        let err = match outcome {
            Ok(data) => {
                if let Some(request_id) = frame.request_id.clone() {
                    handle.send(OutboundMessage::ack_ok(request_id, data));
                }
                return;
            }
            Err(err) => err,
        };

        self.metrics.record_handler_error();
        let hidden = err.is_infrastructure()
            || matches!(err.kind, ErrorKind::Internal | ErrorKind::Serialization);
        if hidden {
            error!(
                event = %frame.event,
                connection_id = %handle.id,
                user_id = %handle.user_id,
                error = %err,
                "Event failed"
            );
        } else {
            debug!(
                event = %frame.event,
                connection_id = %handle.id,
                user_id = %handle.user_id,
                error = %err,
                "Event rejected"
            );
        }

        let message = if hidden {
            "Internal server error".to_string()
        } else {
            err.message
        };
        let code = err.kind.to_string();
        handle.send(match frame.request_id.clone() {
            Some(request_id) => OutboundMessage::ack_err(request_id, message, code),
            None => OutboundMessage::Error {
                event: frame.event.clone(),
                message,
                code,
            },
        });
    }

    async fn dispatch(&self, handle: &Arc<ConnectionHandle>, frame: &InboundFrame) -> AppResult<Value> {
        let id = handle.id;
        match frame.event.as_str() {
            "join_group" => {
                let target: GroupTarget = frame.parse_data()?;
                let change = self.presence.join_group(id, target.group_id).await?;
                self.announce_change(handle, change).await;
                Ok(json!({ "group_id": target.group_id }))
            }
            "join_room" => {
                let target: RoomTarget = frame.parse_data()?;
                let change = self
                    .presence
                    .join_room(id, target.group_id, target.room_id)
                    .await?;
                self.announce_change(handle, change).await;
                Ok(json!({ "group_id": target.group_id, "room_id": target.room_id }))
            }
            "leave_room" => {
                let change = self.presence.leave_room(id).await?;
                self.announce_change(handle, change).await;
                Ok(Value::Null)
            }
            "leave_group" => {
                let change = self.presence.leave_all(id).await?;
                self.announce_change(handle, change).await;
                Ok(Value::Null)
            }
            "create_group" => {
                let req: CreateGroup = frame.parse_data()?;
                let (group, change) = self
                    .presence
                    .create_and_join_group(id, &req.name, handle.user_id)
                    .await?;
                self.announce_change(handle, change).await;
                Ok(json!({ "group_id": group.id, "name": group.name }))
            }
            "delete_group" => {
                let target: GroupTarget = frame.parse_data()?;
                let evicted = self
                    .presence
                    .delete_group(target.group_id, handle.user_id)
                    .await?;
                // Members are no longer subscribed to the group key.
                let notice = OutboundMessage::event(
                    target.group_id.to_string(),
                    "group_deleted",
                    json!({ "group_id": target.group_id }),
                );
                for member in &evicted {
                    if let Some(conn) = self.pool.get(*member) {
                        conn.send(notice.clone());
                    }
                }
                info!(group_id = %target.group_id, evicted = evicted.len(), "Group deleted");
                Ok(json!({ "group_id": target.group_id, "evicted": evicted.len() }))
            }
            "create_room" => {
                let req: CreateRoom = frame.parse_data()?;
                let room = self
                    .presence
                    .create_room(req.group_id, &req.name, req.kind)
                    .await?;
                let payload = json!({
                    "group_id": req.group_id,
                    "room_id": room.id,
                    "name": room.name,
                    "kind": room.kind,
                });
                self.fanout
                    .publish(&req.group_id.to_string(), "room_created", payload.clone())
                    .await;
                Ok(payload)
            }
            "delete_room" => {
                let target: RoomTarget = frame.parse_data()?;
                let evicted = self
                    .presence
                    .delete_room(target.group_id, target.room_id, handle.user_id)
                    .await?;
                self.fanout
                    .publish(
                        &target.group_id.to_string(),
                        "room_deleted",
                        json!({ "group_id": target.group_id, "room_id": target.room_id }),
                    )
                    .await;
                Ok(json!({ "room_id": target.room_id, "evicted": evicted.len() }))
            }
            "rename_room" => {
                let req: RenameRoom = frame.parse_data()?;
                let room = self
                    .presence
                    .rename_room(req.group_id, req.room_id, &req.name, handle.user_id)
                    .await?;
                let payload = json!({
                    "group_id": req.group_id,
                    "room_id": room.id,
                    "name": room.name,
                });
                self.fanout
                    .publish(&req.group_id.to_string(), "room_renamed", payload.clone())
                    .await;
                Ok(payload)
            }
            "update_av_state" => {
                let update: AvUpdate = frame.parse_data()?;
                let conn = self.presence.update_av_state(id, update).await?;
                self.announce_av(&conn).await
            }
            "start_screen_share" => {
                let req: ScreenShare = frame.parse_data()?;
                let conn = self.presence.start_screen_share(id, &req.producer_id).await?;
                self.announce_av(&conn).await
            }
            "stop_screen_share" => {
                let conn = self.presence.stop_screen_share(id).await?;
                self.announce_av(&conn).await
            }
            other => {
                let handler = self.handlers.get(other).map(|h| Arc::clone(h.value()));
                match handler {
                    Some(handler) => {
                        let ctx = EventContext {
                            connection: handle.clone(),
                            presence: self.presence.clone(),
                            fanout: self.fanout.clone(),
                            pool: self.pool.clone(),
                        };
                        handler.handle(&ctx, frame).await
                    }
                    None => Err(AppError::validation(format!("Unknown event '{other}'"))),
                }
            }
        }
    }

    /// Broadcast the room and group transitions of a membership change.
    async fn announce_change(&self, handle: &ConnectionHandle, change: PlacementChange) {
        let who = |group_id: GroupId, room_id: Option<RoomId>| {
            json!({
                "connection_id": handle.id,
                "user_id": handle.user_id,
                "username": handle.username,
                "group_id": group_id,
                "room_id": room_id,
            })
        };

        if let Some((g, r)) = change.left_room() {
            self.fanout
                .publish(&room_broadcast_key(g, r), "user_left_room", who(g, Some(r)))
                .await;
        }
        if let Some(g) = change.left_group() {
            self.fanout
                .publish(&g.to_string(), "user_left_group", who(g, None))
                .await;
        }
        if let Some(g) = change.joined_group() {
            self.fanout
                .publish(&g.to_string(), "user_joined_group", who(g, None))
                .await;
        }
        if let Some((g, r)) = change.joined_room() {
            self.fanout
                .publish(&room_broadcast_key(g, r), "user_joined_room", who(g, Some(r)))
                .await;
        }
    }

    async fn announce_av(&self, conn: &Connection) -> AppResult<Value> {
        let av = serde_json::to_value(&conn.av)?;
        if let (Some(g), Some(r)) = (conn.current_group_id, conn.current_room_id) {
            self.fanout
                .publish(
                    &room_broadcast_key(g, r),
                    "av_state_changed",
                    json!({
                        "connection_id": conn.id,
                        "user_id": conn.user_id,
                        "username": conn.username,
                        "av": av,
                    }),
                )
                .await;
        }
        Ok(av)
    }

    /// Tear down a connection: presence, subscriptions, online state and
    /// session. Safe to call more than once.
    pub async fn disconnect(&self, connection_id: ConnectionId, reason: &str) {
        let Some(handle) = self.pool.remove(connection_id) else {
            return;
        };
        handle.mark_dead();

        match self.presence.remove_connection(connection_id).await {
            Ok(Some((_, change))) => self.announce_change(&handle, change).await,
            Ok(None) => {}
            Err(e) => warn!(connection_id = %connection_id, error = %e, "Failed to remove presence"),
        }
        self.channels.unsubscribe_all(connection_id);

        if self.online.disconnect(handle.user_id).await {
            self.fanout
                .broadcast(
                    PRESENCE_KEY,
                    OutboundMessage::Presence {
                        user_id: handle.user_id,
                        username: handle.username.clone(),
                        status: PresenceStatus::Offline,
                    },
                )
                .await;
        }

        if let Err(e) = self.sessions.end_session_by_connection_id(connection_id).await {
            error!(
                connection_id = %connection_id,
                session_id = %handle.session_id,
                error = %e,
                "Failed to end session on disconnect"
            );
        }

        info!(
            connection_id = %connection_id,
            user_id = %handle.user_id,
            reason = %reason,
            "Connection closed"
        );
    }

    /// Tell the client why, then disconnect it.
    pub async fn force_disconnect(&self, connection_id: ConnectionId, reason: &str) {
        if let Some(handle) = self.pool.get(connection_id) {
            handle.send(OutboundMessage::ForceDisconnect {
                reason: reason.to_string(),
            });
        }
        self.disconnect(connection_id, reason).await;
    }

    /// Disconnect every local connection of a user. Returns how many.
    pub async fn disconnect_user(&self, user_id: UserId, reason: &str) -> usize {
        let handles = self.pool.user_connections(user_id);
        for handle in &handles {
            self.force_disconnect(handle.id, reason).await;
        }
        handles.len()
    }

    /// Disconnect the local connections bound to ended sessions.
    pub async fn disconnect_sessions(&self, sessions: &[Session], reason: &str) -> usize {
        let mut closed = 0;
        for session in sessions {
            if let Some(handle) = self.pool.by_session(session.id) {
                self.force_disconnect(handle.id, reason).await;
                closed += 1;
            }
        }
        closed
    }

    /// Disconnect everything, ending every local session.
    pub async fn shutdown(&self) {
        let handles = self.pool.all();
        info!(connections = handles.len(), "Closing all connections");
        for handle in handles {
            self.force_disconnect(handle.id, "server_shutdown").await;
        }
    }

    pub async fn metrics_snapshot(&self) -> RealtimeMetricsSnapshot {
        let stats = match self.presence.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Failed to read presence stats");
                Default::default()
            }
        };
        RealtimeMetricsSnapshot {
            connections_active: self.pool.len(),
            online_users: self.online.count(),
            groups: stats.groups,
            rooms: stats.rooms,
            fanout_degraded: self.fanout.is_degraded(),
            ..self.metrics.snapshot()
        }
    }
}
