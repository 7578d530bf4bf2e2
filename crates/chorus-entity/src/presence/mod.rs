//! Process-local presence state: live connections, groups and rooms.

pub mod connection;
pub mod group;

pub use connection::{AvState, Connection};
pub use group::{Group, Room, RoomKind, room_broadcast_key};

use serde::{Deserialize, Serialize};

/// Whether a user has at least one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
