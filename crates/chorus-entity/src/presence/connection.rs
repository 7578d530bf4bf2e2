//! Connection presence record.

use chrono::{DateTime, Utc};
use chorus_core::types::{ConnectionId, GroupId, RoomId, SessionId, UserId};
use serde::{Deserialize, Serialize};

/// Audio/video flags a client reports for itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvState {
    pub mic_enabled: bool,
    pub self_deafened: bool,
    pub is_screen_sharing: bool,
    /// Producer handle owned by the media server while sharing.
    pub screen_share_producer_id: Option<String>,
}

/// One live socket and where it currently sits.
///
/// `current_room_id` is only ever set together with `current_group_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub username: String,
    pub session_id: Option<SessionId>,
    pub current_group_id: Option<GroupId>,
    pub current_room_id: Option<RoomId>,
    #[serde(flatten)]
    pub av: AvState,
    pub connected_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(id: ConnectionId, user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            user_id,
            username: username.into(),
            session_id: None,
            current_group_id: None,
            current_room_id: None,
            av: AvState::default(),
            connected_at: Utc::now(),
        }
    }

    /// Forget group/room placement and any screen share tied to it.
    pub fn clear_placement(&mut self) {
        self.current_group_id = None;
        self.current_room_id = None;
        self.av.is_screen_sharing = false;
        self.av.screen_share_producer_id = None;
    }
}
