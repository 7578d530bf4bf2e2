//! Which local connections listen on which broadcast keys.

use std::collections::HashSet;

use dashmap::DashMap;

use chorus_core::types::ConnectionId;

/// Broadcast key → subscribed connections, with the reverse index kept in
/// step so a connection can be dropped from every key at once.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    subscribers: DashMap<String, HashSet<ConnectionId>>,
    by_connection: DashMap<ConnectionId, HashSet<String>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the connection was already subscribed.
    pub fn subscribe(&self, key: &str, conn: ConnectionId) -> bool {
        let added = self
            .subscribers
            .entry(key.to_string())
            .or_default()
            .insert(conn);
        self.by_connection
            .entry(conn)
            .or_default()
            .insert(key.to_string());
        added
    }

    /// Returns `false` when the connection was not subscribed.
    pub fn unsubscribe(&self, key: &str, conn: ConnectionId) -> bool {
        let mut removed = false;
        self.subscribers.remove_if_mut(key, |_, conns| {
            removed = conns.remove(&conn);
            conns.is_empty()
        });
        self.by_connection.remove_if_mut(&conn, |_, keys| {
            keys.remove(key);
            keys.is_empty()
        });
        removed
    }

    /// Drop a connection from every key. Returns the keys it had.
    pub fn unsubscribe_all(&self, conn: ConnectionId) -> HashSet<String> {
        let keys = self
            .by_connection
            .remove(&conn)
            .map(|(_, keys)| keys)
            .unwrap_or_default();
        for key in &keys {
            self.subscribers.remove_if_mut(key.as_str(), |_, conns| {
                conns.remove(&conn);
                conns.is_empty()
            });
        }
        keys
    }

    pub fn subscribers(&self, key: &str) -> Vec<ConnectionId> {
        self.subscribers
            .get(key)
            .map(|conns| conns.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, key: &str, conn: ConnectionId) -> bool {
        self.subscribers
            .get(key)
            .is_some_and(|conns| conns.contains(&conn))
    }

    pub fn subscriptions(&self, conn: ConnectionId) -> HashSet<String> {
        self.by_connection
            .get(&conn)
            .map(|keys| keys.clone())
            .unwrap_or_default()
    }

    pub fn key_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_is_idempotent() {
        let reg = ChannelRegistry::new();
        let c = ConnectionId::new();
        assert!(reg.subscribe("g1", c));
        assert!(!reg.subscribe("g1", c));
        assert_eq!(reg.subscribers("g1"), vec![c]);
    }

    #[test]
    fn test_empty_keys_are_dropped() {
        let reg = ChannelRegistry::new();
        let c = ConnectionId::new();
        reg.subscribe("g1", c);
        assert!(reg.unsubscribe("g1", c));
        assert!(!reg.unsubscribe("g1", c));
        assert_eq!(reg.key_count(), 0);
        assert!(reg.subscriptions(c).is_empty());
    }

    #[test]
    fn test_unsubscribe_all() {
        let reg = ChannelRegistry::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        reg.subscribe("g1", a);
        reg.subscribe("g1::r1", a);
        reg.subscribe("g1", b);

        let keys = reg.unsubscribe_all(a);
        assert_eq!(keys.len(), 2);
        assert_eq!(reg.subscribers("g1"), vec![b]);
        assert!(!reg.is_subscribed("g1::r1", a));
        assert_eq!(reg.key_count(), 1);
    }
}
