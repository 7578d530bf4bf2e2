//! WebSocket upgrade handler and per-socket pump.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use chorus_auth::Claims;
use chorus_core::error::AppError;
use chorus_realtime::connection::{ConnectionHandle, HeartbeatExit, run_heartbeat};
use chorus_realtime::gateway::ClientInfo;
use chorus_realtime::message::OutboundMessage;

use crate::error::ApiError;
use crate::extractors::ClientMeta;
use crate::state::AppState;

/// Token locations accepted besides the `Authorization` header.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
    pub auth: Option<String>,
}

/// GET /ws
///
/// The access token is read from the bearer header, then `?token=`, then
/// `?auth=`. The socket is refused with 401 before upgrading when it is
/// missing or invalid.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<WsQuery>,
    ClientMeta(client): ClientMeta,
    ws: WebSocketUpgrade,
) -> Response {
    let token = bearer
        .map(|TypedHeader(Authorization(b))| b.token().to_string())
        .or(query.token)
        .or(query.auth);

    let claims = match state.realtime.gateway.authenticate(token.as_deref()) {
        Ok(claims) => claims,
        Err(rejection) => return ApiError(AppError::from(rejection)).into_response(),
    };

    ws.max_message_size(state.config.realtime.max_message_bytes)
        .on_upgrade(move |socket| serve_socket(state, claims, client, socket))
}

async fn serve_socket(state: AppState, claims: Claims, client: ClientInfo, mut socket: WebSocket) {
    let gateway = Arc::clone(&state.realtime.gateway);
    let (handle, outbound) = match gateway.handshake(claims, client).await {
        Ok(accepted) => accepted,
        Err(e) => {
            warn!(error = %e, "Handshake failed, closing socket");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let reason = pump(&state, &handle, outbound, socket).await;
    gateway.disconnect(handle.id, reason).await;
}

/// Move frames both ways until the socket ends. Returns the close reason.
async fn pump(
    state: &AppState,
    handle: &Arc<ConnectionHandle>,
    mut outbound: mpsc::Receiver<OutboundMessage>,
    socket: WebSocket,
) -> &'static str {
    let gateway = &state.realtime.gateway;
    let (mut sink, mut stream) = socket.split();
    let heartbeat = run_heartbeat(Arc::clone(handle), gateway.heartbeat_config());
    tokio::pin!(heartbeat);

    let reason = loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    gateway.handle_frame(handle.id, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break "client_disconnect",
                Some(Ok(_)) => handle.record_seen(),
                Some(Err(e)) => {
                    debug!(connection_id = %handle.id, error = %e, "Socket read failed");
                    break "transport_error";
                }
            },
            Some(msg) = outbound.recv() => {
                if !send_json(&mut sink, &msg).await {
                    break "transport_error";
                }
            }
            _ = handle.closed() => {
                // Deliver what was queued before the close, typically the
                // force_disconnect notice.
                while let Ok(msg) = outbound.try_recv() {
                    if !send_json(&mut sink, &msg).await {
                        break;
                    }
                }
                break "server_close";
            }
            exit = &mut heartbeat => {
                if exit == HeartbeatExit::TimedOut {
                    break "heartbeat_timeout";
                }
                break "server_close";
            }
        }
    };

    let _ = sink.send(Message::Close(None)).await;
    reason
}

/// Returns `false` once the socket can no longer be written.
async fn send_json<S>(sink: &mut S, msg: &OutboundMessage) -> bool
where
    S: futures::Sink<Message> + Unpin,
{
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize outbound frame");
            return true;
        }
    };
    sink.send(Message::Text(json.into())).await.is_ok()
}
