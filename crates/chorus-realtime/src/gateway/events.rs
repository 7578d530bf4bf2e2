//! Payloads of the built-in presence events.

use serde::Deserialize;

use chorus_core::types::{GroupId, RoomId};
use chorus_entity::presence::RoomKind;

/// Names handled by the gateway itself. Registered handlers cannot take them.
pub const BUILTIN_EVENTS: &[&str] = &[
    "pong",
    "join_group",
    "join_room",
    "leave_room",
    "leave_group",
    "create_group",
    "delete_group",
    "create_room",
    "delete_room",
    "rename_room",
    "update_av_state",
    "start_screen_share",
    "stop_screen_share",
];

#[derive(Debug, Deserialize)]
pub struct GroupTarget {
    pub group_id: GroupId,
}

#[derive(Debug, Deserialize)]
pub struct RoomTarget {
    pub group_id: GroupId,
    pub room_id: RoomId,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroup {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoom {
    pub group_id: GroupId,
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: RoomKind,
}

fn default_kind() -> RoomKind {
    RoomKind::Text
}

#[derive(Debug, Deserialize)]
pub struct RenameRoom {
    pub group_id: GroupId,
    pub room_id: RoomId,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ScreenShare {
    pub producer_id: String,
}
