//! Pool of this process's live connections.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use chorus_core::types::{ConnectionId, SessionId, UserId};

use super::handle::ConnectionHandle;

/// Live connections indexed by id, by user, by username and by session.
///
/// The maps are updated together on insert and remove. Username keys are
/// lowercased.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    by_id: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    by_user: DashMap<UserId, HashSet<ConnectionId>>,
    by_username: DashMap<String, HashSet<ConnectionId>>,
    by_session: DashMap<SessionId, ConnectionId>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handle: Arc<ConnectionHandle>) {
        self.by_user
            .entry(handle.user_id)
            .or_default()
            .insert(handle.id);
        self.by_username
            .entry(handle.username.to_lowercase())
            .or_default()
            .insert(handle.id);
        self.by_session.insert(handle.session_id, handle.id);
        self.by_id.insert(handle.id, handle);
    }

    /// Remove a connection from every index.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        let (_, handle) = self.by_id.remove(&id)?;
        self.by_user.remove_if_mut(&handle.user_id, |_, ids| {
            ids.remove(&id);
            ids.is_empty()
        });
        self.by_username
            .remove_if_mut(&handle.username.to_lowercase(), |_, ids| {
                ids.remove(&id);
                ids.is_empty()
            });
        self.by_session
            .remove_if(&handle.session_id, |_, owner| *owner == id);
        Some(handle)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.by_id.get(&id).map(|entry| entry.value().clone())
    }

    pub fn user_connections(&self, user_id: UserId) -> Vec<Arc<ConnectionHandle>> {
        self.resolve(self.by_user.get(&user_id).map(|ids| ids.clone()))
    }

    /// Case-insensitive lookup without scanning every connection.
    pub fn username_connections(&self, username: &str) -> Vec<Arc<ConnectionHandle>> {
        self.resolve(
            self.by_username
                .get(&username.to_lowercase())
                .map(|ids| ids.clone()),
        )
    }

    fn resolve(&self, ids: Option<HashSet<ConnectionId>>) -> Vec<Arc<ConnectionHandle>> {
        ids.unwrap_or_default()
            .into_iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// The live connection bound to a session, if it is on this process.
    pub fn by_session(&self, session_id: SessionId) -> Option<Arc<ConnectionHandle>> {
        let id = *self.by_session.get(&session_id)?;
        self.get(id)
    }

    pub fn all(&self) -> Vec<Arc<ConnectionHandle>> {
        self.by_id.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_entity::user::UserRole;
    use tokio::sync::mpsc;

    fn handle(user_id: UserId, username: &str) -> Arc<ConnectionHandle> {
        let (tx, _rx) = mpsc::channel(1);
        Arc::new(ConnectionHandle::new(
            ConnectionId::new(),
            user_id,
            username.to_string(),
            UserRole::Member,
            SessionId::new(),
            tx,
        ))
    }

    #[test]
    fn test_indexes_stay_in_step() {
        let pool = ConnectionPool::new();
        let bob = UserId::new();
        let tab1 = handle(bob, "Bob");
        let tab2 = handle(bob, "Bob");
        pool.add(tab1.clone());
        pool.add(tab2.clone());

        assert_eq!(pool.user_connections(bob).len(), 2);
        assert_eq!(pool.username_connections("bob").len(), 2);
        assert_eq!(pool.user_count(), 1);

        pool.remove(tab1.id);
        assert_eq!(pool.username_connections("BOB").len(), 1);
        pool.remove(tab2.id);
        assert!(pool.username_connections("bob").is_empty());
        assert_eq!(pool.user_count(), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_remove_unknown_is_none() {
        let pool = ConnectionPool::new();
        assert!(pool.remove(ConnectionId::new()).is_none());
    }

    #[test]
    fn test_lookup_by_session() {
        let pool = ConnectionPool::new();
        let h = handle(UserId::new(), "carol");
        pool.add(h.clone());
        assert_eq!(pool.by_session(h.session_id).map(|c| c.id), Some(h.id));
        assert!(pool.by_session(SessionId::new()).is_none());

        pool.remove(h.id);
        assert!(pool.by_session(h.session_id).is_none());
    }
}
