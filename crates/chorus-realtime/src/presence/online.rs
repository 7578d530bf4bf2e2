//! Online/offline tracking across a user's connections.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tracing::warn;

use chorus_cache::CacheManager;
use chorus_cache::keys;
use chorus_core::traits::cache::CacheProvider;
use chorus_core::types::UserId;

#[derive(Debug)]
struct OnlineEntry {
    username: String,
    connections: usize,
}

/// A user with at least one live connection on this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnlineUser {
    pub user_id: UserId,
    pub username: String,
    pub connections: usize,
}

/// Counts live connections per user so that a second tab does not announce
/// the user again and closing one of two tabs does not announce them gone.
///
/// With a shared cache the tracker also keeps, per user, the number of
/// processes holding at least one of their connections. Announcements then
/// follow the deployment-wide 0 to 1 and 1 to 0 transitions, so a user
/// connected through two processes stays online when one of them closes.
#[derive(Debug, Default)]
pub struct OnlineTracker {
    users: DashMap<UserId, OnlineEntry>,
    shared: Option<SharedCount>,
}

#[derive(Debug)]
struct SharedCount {
    cache: Arc<CacheManager>,
    ttl: Duration,
}

impl OnlineTracker {
    /// A tracker that only sees this process.
    pub fn new() -> Self {
        Self::default()
    }

    /// A tracker whose announcements account for every process sharing `cache`.
    pub fn shared(cache: Arc<CacheManager>, ttl: Duration) -> Self {
        Self {
            users: DashMap::new(),
            shared: Some(SharedCount { cache, ttl }),
        }
    }

    /// Record a new connection. Returns `true` when the user just came online.
    pub async fn connect(&self, user_id: UserId, username: &str) -> bool {
        let first_here = match self.users.entry(user_id) {
            Entry::Occupied(mut e) => {
                e.get_mut().connections += 1;
                false
            }
            Entry::Vacant(e) => {
                e.insert(OnlineEntry {
                    username: username.to_string(),
                    connections: 1,
                });
                true
            }
        };
        if !first_here {
            return false;
        }
        match self.add_node(user_id, 1).await {
            Some(nodes) => nodes == 1,
            None => true,
        }
    }

    /// Record a closed connection. Returns `true` when the user just went offline.
    pub async fn disconnect(&self, user_id: UserId) -> bool {
        let mut last_here = false;
        self.users.remove_if_mut(&user_id, |_, entry| {
            entry.connections = entry.connections.saturating_sub(1);
            last_here = entry.connections == 0;
            last_here
        });
        if !last_here {
            return false;
        }
        match self.add_node(user_id, -1).await {
            Some(nodes) => nodes == 0,
            None => true,
        }
    }

    /// Adjust the shared per-user process count. `None` when there is no
    /// shared cache or it failed, in which case the local transition decides.
    async fn add_node(&self, user_id: UserId, delta: i64) -> Option<i64> {
        let shared = self.shared.as_ref()?;
        match shared
            .cache
            .counter_add(&keys::user_online_nodes(user_id), delta, shared.ttl)
            .await
        {
            Ok(nodes) => Some(nodes),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to update shared online count");
                None
            }
        }
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.users.contains_key(&user_id)
    }

    pub fn online_users(&self) -> Vec<OnlineUser> {
        self.users
            .iter()
            .map(|e| OnlineUser {
                user_id: *e.key(),
                username: e.value().username.clone(),
                connections: e.value().connections,
            })
            .collect()
    }

    pub fn count(&self) -> usize {
        self.users.len()
    }
}
