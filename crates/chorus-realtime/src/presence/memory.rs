//! In-process presence store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use chorus_core::error::AppError;
use chorus_core::result::AppResult;
use chorus_core::types::{ConnectionId, GroupId, RoomId, UserId};
use chorus_entity::presence::{Connection, Group, Room, RoomKind, room_broadcast_key};

use super::store::{AvUpdate, Placement, PlacementChange, PresenceStats, PresenceStore};
use crate::channel::ChannelRegistry;

const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Default)]
struct PresenceState {
    connections: HashMap<ConnectionId, Connection>,
    groups: HashMap<GroupId, Group>,
}

/// Presence held in process memory behind one lock.
///
/// Every operation runs start to finish under the write lock, so the
/// membership checks and the mutations they guard are never interleaved with
/// another operation.
#[derive(Debug)]
pub struct MemoryPresenceStore {
    state: RwLock<PresenceState>,
    channels: Arc<ChannelRegistry>,
}

impl MemoryPresenceStore {
    pub fn new(channels: Arc<ChannelRegistry>) -> Self {
        Self {
            state: RwLock::new(PresenceState::default()),
            channels,
        }
    }
}

fn connection_not_found() -> AppError {
    AppError::not_found("Connection not found")
}

fn group_not_found() -> AppError {
    AppError::not_found("Group not found")
}

fn room_not_found() -> AppError {
    AppError::not_found("Room not found")
}

fn validate_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::validation(format!(
            "Name must be between 1 and {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn owned_group<'a>(
    groups: &'a mut HashMap<GroupId, Group>,
    group_id: GroupId,
    requester: UserId,
) -> AppResult<&'a mut Group> {
    let group = groups.get_mut(&group_id).ok_or_else(group_not_found)?;
    if group.owner_id != requester {
        return Err(AppError::authorization(
            "Only the group owner can do that",
        ));
    }
    Ok(group)
}

impl PresenceState {
    fn placement(&self, id: ConnectionId) -> AppResult<Placement> {
        self.connections
            .get(&id)
            .map(Placement::of)
            .ok_or_else(connection_not_found)
    }

    /// Leave the current room, keeping the group.
    fn leave_room(&mut self, channels: &ChannelRegistry, id: ConnectionId) -> AppResult<()> {
        let conn = self.connections.get_mut(&id).ok_or_else(connection_not_found)?;
        let (Some(group_id), Some(room_id)) = (conn.current_group_id, conn.current_room_id) else {
            return Ok(());
        };

        if let Some(room) = self
            .groups
            .get_mut(&group_id)
            .and_then(|g| g.rooms.get_mut(&room_id))
        {
            if room.members.contains(&id) {
                room.members.remove(&id);
            }
        }
        channels.unsubscribe(&room_broadcast_key(group_id, room_id), id);

        conn.current_room_id = None;
        conn.av.is_screen_sharing = false;
        conn.av.screen_share_producer_id = None;
        Ok(())
    }

    /// Leave the current room and group.
    fn leave_all(&mut self, channels: &ChannelRegistry, id: ConnectionId) -> AppResult<()> {
        self.leave_room(channels, id)?;
        let conn = self.connections.get_mut(&id).ok_or_else(connection_not_found)?;
        if let Some(group_id) = conn.current_group_id {
            if let Some(group) = self.groups.get_mut(&group_id) {
                if group.members.contains(&id) {
                    group.members.remove(&id);
                }
            }
            channels.unsubscribe(&group_id.to_string(), id);
        }
        conn.clear_placement();
        Ok(())
    }

    fn join_group(
        &mut self,
        channels: &ChannelRegistry,
        id: ConnectionId,
        group_id: GroupId,
    ) -> AppResult<()> {
        if !self.groups.contains_key(&group_id) {
            return Err(group_not_found());
        }
        let current = self.placement(id)?.group_id;
        if current == Some(group_id) {
            return Ok(());
        }
        if current.is_some() {
            self.leave_all(channels, id)?;
        }

        let group = self.groups.get_mut(&group_id).ok_or_else(group_not_found)?;
        if !group.members.contains(&id) {
            group.members.insert(id);
        }
        channels.subscribe(&group.broadcast_key(), id);

        let conn = self.connections.get_mut(&id).ok_or_else(connection_not_found)?;
        conn.current_group_id = Some(group_id);
        conn.current_room_id = None;
        Ok(())
    }

    fn join_room(
        &mut self,
        channels: &ChannelRegistry,
        id: ConnectionId,
        group_id: GroupId,
        room_id: RoomId,
    ) -> AppResult<()> {
        let group = self.groups.get(&group_id).ok_or_else(group_not_found)?;
        if !group.rooms.contains_key(&room_id) {
            return Err(room_not_found());
        }

        let placement = self.placement(id)?;
        if placement.group_id != Some(group_id) {
            self.join_group(channels, id, group_id)?;
        } else if placement.room_id.is_some_and(|r| r != room_id) {
            self.leave_room(channels, id)?;
        }

        let room = self
            .groups
            .get_mut(&group_id)
            .and_then(|g| g.rooms.get_mut(&room_id))
            .ok_or_else(room_not_found)?;
        if !room.members.contains(&id) {
            room.members.insert(id);
        }
        channels.subscribe(&room_broadcast_key(group_id, room_id), id);

        let conn = self.connections.get_mut(&id).ok_or_else(connection_not_found)?;
        conn.current_room_id = Some(room_id);
        Ok(())
    }

    fn room_kind(&self, placement: Placement) -> Option<RoomKind> {
        let group = self.groups.get(&placement.group_id?)?;
        group.rooms.get(&placement.room_id?).map(|r| r.kind)
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn register_connection(&self, connection: Connection) -> AppResult<()> {
        let mut state = self.state.write().await;
        state
            .connections
            .entry(connection.id)
            .or_insert(connection);
        Ok(())
    }

    async fn connection(&self, id: ConnectionId) -> AppResult<Option<Connection>> {
        Ok(self.state.read().await.connections.get(&id).cloned())
    }

    async fn remove_connection(
        &self,
        id: ConnectionId,
    ) -> AppResult<Option<(Connection, PlacementChange)>> {
        let mut state = self.state.write().await;
        let Ok(before) = state.placement(id) else {
            return Ok(None);
        };
        state.leave_all(&self.channels, id)?;
        self.channels.unsubscribe_all(id);
        Ok(state.connections.remove(&id).map(|conn| {
            let change = PlacementChange {
                before,
                after: Placement::default(),
            };
            (conn, change)
        }))
    }

    async fn join_group(&self, id: ConnectionId, group_id: GroupId) -> AppResult<PlacementChange> {
        let mut state = self.state.write().await;
        let before = state.placement(id)?;
        state.join_group(&self.channels, id, group_id)?;
        let after = state.placement(id)?;
        debug!(connection_id = %id, group_id = %group_id, "Joined group");
        Ok(PlacementChange { before, after })
    }

    async fn join_room(
        &self,
        id: ConnectionId,
        group_id: GroupId,
        room_id: RoomId,
    ) -> AppResult<PlacementChange> {
        let mut state = self.state.write().await;
        let before = state.placement(id)?;
        state.join_room(&self.channels, id, group_id, room_id)?;
        let after = state.placement(id)?;
        debug!(connection_id = %id, group_id = %group_id, room_id = %room_id, "Joined room");
        Ok(PlacementChange { before, after })
    }

    async fn leave_room(&self, id: ConnectionId) -> AppResult<PlacementChange> {
        let mut state = self.state.write().await;
        let before = state.placement(id)?;
        state.leave_room(&self.channels, id)?;
        Ok(PlacementChange {
            before,
            after: state.placement(id)?,
        })
    }

    async fn leave_all(&self, id: ConnectionId) -> AppResult<PlacementChange> {
        let mut state = self.state.write().await;
        let before = state.placement(id)?;
        state.leave_all(&self.channels, id)?;
        Ok(PlacementChange {
            before,
            after: Placement::default(),
        })
    }

    async fn create_group(&self, name: &str, owner_id: UserId) -> AppResult<Group> {
        let group = Group::new(validate_name(name)?, owner_id);
        self.state
            .write()
            .await
            .groups
            .insert(group.id, group.clone());
        Ok(group)
    }

    async fn create_and_join_group(
        &self,
        id: ConnectionId,
        name: &str,
        owner_id: UserId,
    ) -> AppResult<(Group, PlacementChange)> {
        let group = Group::new(validate_name(name)?, owner_id);
        let group_id = group.id;
        let mut state = self.state.write().await;
        let before = state.placement(id)?;
        state.groups.insert(group_id, group);
        state.join_group(&self.channels, id, group_id)?;
        let after = state.placement(id)?;
        let group = state
            .groups
            .get(&group_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Group not found"))?;
        debug!(connection_id = %id, group_id = %group_id, "Created and joined group");
        Ok((group, PlacementChange { before, after }))
    }

    async fn group(&self, group_id: GroupId) -> AppResult<Option<Group>> {
        Ok(self.state.read().await.groups.get(&group_id).cloned())
    }

    async fn delete_group(
        &self,
        group_id: GroupId,
        requester: UserId,
    ) -> AppResult<Vec<ConnectionId>> {
        let mut state = self.state.write().await;
        let members: Vec<ConnectionId> = owned_group(&mut state.groups, group_id, requester)?
            .members
            .iter()
            .copied()
            .collect();

        for member in &members {
            state.leave_all(&self.channels, *member)?;
        }
        state.groups.remove(&group_id);
        Ok(members)
    }

    async fn create_room(&self, group_id: GroupId, name: &str, kind: RoomKind) -> AppResult<Room> {
        let room = Room::new(validate_name(name)?, kind);
        let mut state = self.state.write().await;
        let group = state.groups.get_mut(&group_id).ok_or_else(group_not_found)?;
        group.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn delete_room(
        &self,
        group_id: GroupId,
        room_id: RoomId,
        requester: UserId,
    ) -> AppResult<Vec<ConnectionId>> {
        let mut state = self.state.write().await;
        let members: Vec<ConnectionId> = owned_group(&mut state.groups, group_id, requester)?
            .rooms
            .get(&room_id)
            .ok_or_else(room_not_found)?
            .members
            .iter()
            .copied()
            .collect();

        for member in &members {
            state.leave_room(&self.channels, *member)?;
        }
        if let Some(group) = state.groups.get_mut(&group_id) {
            group.rooms.remove(&room_id);
        }
        Ok(members)
    }

    async fn rename_room(
        &self,
        group_id: GroupId,
        room_id: RoomId,
        name: &str,
        requester: UserId,
    ) -> AppResult<Room> {
        let name = validate_name(name)?;
        let mut state = self.state.write().await;
        let room = owned_group(&mut state.groups, group_id, requester)?
            .rooms
            .get_mut(&room_id)
            .ok_or_else(room_not_found)?;
        room.name = name;
        Ok(room.clone())
    }

    async fn update_av_state(&self, id: ConnectionId, update: AvUpdate) -> AppResult<Connection> {
        let mut state = self.state.write().await;
        let conn = state.connections.get_mut(&id).ok_or_else(connection_not_found)?;
        if let Some(mic) = update.mic_enabled {
            conn.av.mic_enabled = mic;
        }
        if let Some(deafened) = update.self_deafened {
            conn.av.self_deafened = deafened;
        }
        Ok(conn.clone())
    }

    async fn start_screen_share(
        &self,
        id: ConnectionId,
        producer_id: &str,
    ) -> AppResult<Connection> {
        let mut state = self.state.write().await;
        let placement = state.placement(id)?;
        if state.room_kind(placement) != Some(RoomKind::Voice) {
            return Err(AppError::validation(
                "Screen sharing requires being in a voice room",
            ));
        }
        let conn = state.connections.get_mut(&id).ok_or_else(connection_not_found)?;
        conn.av.is_screen_sharing = true;
        conn.av.screen_share_producer_id = Some(producer_id.to_string());
        Ok(conn.clone())
    }

    async fn stop_screen_share(&self, id: ConnectionId) -> AppResult<Connection> {
        let mut state = self.state.write().await;
        let conn = state.connections.get_mut(&id).ok_or_else(connection_not_found)?;
        conn.av.is_screen_sharing = false;
        conn.av.screen_share_producer_id = None;
        Ok(conn.clone())
    }

    async fn purge_empty_groups(&self) -> AppResult<Vec<GroupId>> {
        let mut state = self.state.write().await;
        let empty: Vec<GroupId> = state
            .groups
            .values()
            .filter(|g| g.is_empty())
            .map(|g| g.id)
            .collect();
        for id in &empty {
            state.groups.remove(id);
        }
        Ok(empty)
    }

    async fn stats(&self) -> AppResult<PresenceStats> {
        let state = self.state.read().await;
        Ok(PresenceStats {
            connections: state.connections.len(),
            groups: state.groups.len(),
            rooms: state.groups.values().map(|g| g.rooms.len()).sum(),
        })
    }
}
