//! Handle to one live socket.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use chorus_core::types::{ConnectionId, SessionId, UserId};
use chorus_entity::user::UserRole;

use crate::message::OutboundMessage;

/// Outbound sender plus identity and liveness of one connection.
///
/// The transport task owns the receiving half of the channel and watches
/// [`Self::closed`] to know when the server wants the socket gone.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub username: String,
    pub role: UserRole,
    pub session_id: SessionId,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<OutboundMessage>,
    alive: AtomicBool,
    close: CancellationToken,
    started: Instant,
    /// Milliseconds after `started` at which the client was last heard from.
    last_seen_ms: AtomicU64,
    /// Milliseconds after `started` of the last session activity write.
    last_touch_ms: AtomicU64,
}

impl ConnectionHandle {
    pub fn new(
        id: ConnectionId,
        user_id: UserId,
        username: String,
        role: UserRole,
        session_id: SessionId,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        Self {
            id,
            user_id,
            username,
            role,
            session_id,
            connected_at: Utc::now(),
            sender,
            alive: AtomicBool::new(true),
            close: CancellationToken::new(),
            started: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
            last_touch_ms: AtomicU64::new(0),
        }
    }

    /// Queue a frame. Returns `false` when the frame was dropped.
    pub fn send(&self, msg: OutboundMessage) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.sender.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection_id = %self.id, "Outbound buffer full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_dead();
                false
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Stop accepting frames and signal the transport to close.
    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.close.cancel();
    }

    /// Resolves once the connection has been marked dead.
    pub async fn closed(&self) {
        self.close.cancelled().await;
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Record that the client was heard from (any frame or pong).
    pub fn record_seen(&self) {
        self.last_seen_ms.store(self.elapsed_ms(), Ordering::Relaxed);
    }

    /// Time since the client was last heard from.
    pub fn since_last_seen(&self) -> Duration {
        let last = self.last_seen_ms.load(Ordering::Relaxed);
        Duration::from_millis(self.elapsed_ms().saturating_sub(last))
    }

    /// Claim the right to write session activity. Returns `true` at most once
    /// per `interval`, across concurrent callers.
    pub fn claim_touch(&self, interval: Duration) -> bool {
        let now = self.elapsed_ms();
        let last = self.last_touch_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < interval.as_millis() as u64 {
            return false;
        }
        self.last_touch_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }
}
