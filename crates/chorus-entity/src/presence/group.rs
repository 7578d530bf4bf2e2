//! Group and room membership records.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use chorus_core::types::{ConnectionId, GroupId, RoomId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Text,
    Voice,
}

/// A text or voice sub-space of exactly one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub kind: RoomKind,
    pub members: HashSet<ConnectionId>,
}

impl Room {
    pub fn new(name: impl Into<String>, kind: RoomKind) -> Self {
        Self {
            id: RoomId::new(),
            name: name.into(),
            kind,
            members: HashSet::new(),
        }
    }
}

/// A community of rooms with its own member set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub owner_id: UserId,
    pub members: HashSet<ConnectionId>,
    pub rooms: HashMap<RoomId, Room>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: impl Into<String>, owner_id: UserId) -> Self {
        Self {
            id: GroupId::new(),
            name: name.into(),
            owner_id,
            members: HashSet::new(),
            rooms: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Broadcast key of the group as a whole.
    pub fn broadcast_key(&self) -> String {
        self.id.to_string()
    }
}

/// Broadcast key of a room: `{groupId}::{roomId}`.
pub fn room_broadcast_key(group_id: GroupId, room_id: RoomId) -> String {
    format!("{group_id}::{room_id}")
}
