//! The presence store contract.
//!
//! Every join and leave keeps a connection in at most one group and at most
//! one room, and repeating a join with the same target leaves membership
//! unchanged. Joins subscribe the connection to the target's broadcast keys;
//! leaves unsubscribe them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chorus_core::result::AppResult;
use chorus_core::types::{ConnectionId, GroupId, RoomId, UserId};
use chorus_entity::presence::{Connection, Group, Room, RoomKind};

/// Where a connection sits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub group_id: Option<GroupId>,
    pub room_id: Option<RoomId>,
}

impl Placement {
    pub fn of(connection: &Connection) -> Self {
        Self {
            group_id: connection.current_group_id,
            room_id: connection.current_room_id,
        }
    }
}

/// Placement before and after a membership operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementChange {
    pub before: Placement,
    pub after: Placement,
}

impl PlacementChange {
    pub fn is_noop(&self) -> bool {
        self.before == self.after
    }

    /// The room left, as `(group, room)`, if the operation left one.
    pub fn left_room(&self) -> Option<(GroupId, RoomId)> {
        let (g, r) = (self.before.group_id?, self.before.room_id?);
        (self.after.group_id != Some(g) || self.after.room_id != Some(r)).then_some((g, r))
    }

    /// The group left, if the operation left one.
    pub fn left_group(&self) -> Option<GroupId> {
        self.before
            .group_id
            .filter(|g| self.after.group_id != Some(*g))
    }

    pub fn joined_room(&self) -> Option<(GroupId, RoomId)> {
        let (g, r) = (self.after.group_id?, self.after.room_id?);
        (self.before.group_id != Some(g) || self.before.room_id != Some(r)).then_some((g, r))
    }

    pub fn joined_group(&self) -> Option<GroupId> {
        self.after
            .group_id
            .filter(|g| self.before.group_id != Some(*g))
    }
}

/// Partial AV-state update; `None` leaves a flag unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvUpdate {
    #[serde(default)]
    pub mic_enabled: Option<bool>,
    #[serde(default)]
    pub self_deafened: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceStats {
    pub connections: usize,
    pub groups: usize,
    pub rooms: usize,
}

/// Connections, groups and rooms of this process.
#[async_trait]
pub trait PresenceStore: Send + Sync + std::fmt::Debug + 'static {
    async fn register_connection(&self, connection: Connection) -> AppResult<()>;

    async fn connection(&self, id: ConnectionId) -> AppResult<Option<Connection>>;

    /// Full teardown: leave everything, drop all subscriptions and forget the
    /// connection. Returns the final record and the placement it left.
    async fn remove_connection(
        &self,
        id: ConnectionId,
    ) -> AppResult<Option<(Connection, PlacementChange)>>;

    /// Join a group, leaving any other group or room first.
    async fn join_group(&self, id: ConnectionId, group_id: GroupId) -> AppResult<PlacementChange>;

    /// Join a room, joining its group first when needed and leaving the
    /// previous room.
    async fn join_room(
        &self,
        id: ConnectionId,
        group_id: GroupId,
        room_id: RoomId,
    ) -> AppResult<PlacementChange>;

    /// Leave the current room only; group membership is kept.
    async fn leave_room(&self, id: ConnectionId) -> AppResult<PlacementChange>;

    /// Leave the current room and group.
    async fn leave_all(&self, id: ConnectionId) -> AppResult<PlacementChange>;

    async fn create_group(&self, name: &str, owner_id: UserId) -> AppResult<Group>;

    /// Create a group and move the connection into it in one step, so the
    /// group is never observed empty.
    async fn create_and_join_group(
        &self,
        id: ConnectionId,
        name: &str,
        owner_id: UserId,
    ) -> AppResult<(Group, PlacementChange)>;

    async fn group(&self, group_id: GroupId) -> AppResult<Option<Group>>;

    /// Delete a group owned by `requester`, evicting its members.
    async fn delete_group(&self, group_id: GroupId, requester: UserId)
    -> AppResult<Vec<ConnectionId>>;

    async fn create_room(&self, group_id: GroupId, name: &str, kind: RoomKind) -> AppResult<Room>;

    /// Delete a room of a group owned by `requester`, evicting its members.
    async fn delete_room(
        &self,
        group_id: GroupId,
        room_id: RoomId,
        requester: UserId,
    ) -> AppResult<Vec<ConnectionId>>;

    async fn rename_room(
        &self,
        group_id: GroupId,
        room_id: RoomId,
        name: &str,
        requester: UserId,
    ) -> AppResult<Room>;

    async fn update_av_state(&self, id: ConnectionId, update: AvUpdate) -> AppResult<Connection>;

    /// Start a screen share. The connection must be in a voice room.
    async fn start_screen_share(&self, id: ConnectionId, producer_id: &str)
    -> AppResult<Connection>;

    async fn stop_screen_share(&self, id: ConnectionId) -> AppResult<Connection>;

    /// Remove every group without members. Returns the removed ids.
    async fn purge_empty_groups(&self) -> AppResult<Vec<GroupId>>;

    async fn stats(&self) -> AppResult<PresenceStats>;
}
