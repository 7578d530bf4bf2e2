//! Session registry.
//!
//! The repository row is the source of truth. Each active session is also
//! mirrored under three cache keys (socket, user pointer, details), which are
//! always written and cleared together through [`CacheProvider::apply_batch`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use chorus_cache::CacheManager;
use chorus_cache::keys;
use chorus_core::config::session::SessionConfig;
use chorus_core::error::AppError;
use chorus_core::result::AppResult;
use chorus_core::traits::cache::{CacheOp, CacheProvider};
use chorus_core::types::{ConnectionId, SessionId, UserId};
use chorus_database::SessionRepository;
use chorus_entity::session::{CreateSession, Session, SessionSnapshot, UserSessionPointer};

/// Outcome of one mirror reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub removed: usize,
}

#[derive(Debug, Clone)]
pub struct SessionRegistry {
    repo: Arc<dyn SessionRepository>,
    cache: Arc<CacheManager>,
    mirror_ttl: Duration,
    idle_timeout: chrono::Duration,
    retention: chrono::Duration,
}

impl SessionRegistry {
    pub fn new(
        config: &SessionConfig,
        repo: Arc<dyn SessionRepository>,
        cache: Arc<CacheManager>,
    ) -> Self {
        Self {
            repo,
            cache,
            mirror_ttl: Duration::from_secs(config.mirror_ttl_hours * 3600),
            idle_timeout: chrono::Duration::minutes(config.idle_timeout_minutes as i64),
            retention: chrono::Duration::days(config.retention_days as i64),
        }
    }

    /// The cache holding the session mirror.
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// How long mirrored entries live in the cache.
    pub fn mirror_ttl(&self) -> Duration {
        self.mirror_ttl
    }

    /// The configured inactivity window used by the stale-session sweep.
    pub fn idle_timeout(&self) -> chrono::Duration {
        self.idle_timeout
    }

    /// Record a new session, then mirror it. A failed mirror write is logged;
    /// lookups fall back to the repository.
    pub async fn create_session(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> AppResult<Session> {
        let session = self
            .repo
            .create(&CreateSession {
                user_id,
                connection_id,
                user_agent,
                ip_address,
            })
            .await?;

        if let Err(e) = self.write_mirror(&session).await {
            warn!(
                session_id = %session.id,
                connection_id = %connection_id,
                error = %e,
                "Failed to mirror session into cache"
            );
        }

        info!(
            session_id = %session.id,
            user_id = %user_id,
            connection_id = %connection_id,
            "Session created"
        );
        Ok(session)
    }

    async fn write_mirror(&self, session: &Session) -> AppResult<()> {
        let pointer = serde_json::to_string(&UserSessionPointer {
            session_id: session.id,
            connection_id: session.connection_id,
        })?;
        let snapshot = serde_json::to_string(&SessionSnapshot::from(session))?;

        self.cache
            .apply_batch(vec![
                CacheOp::set(
                    keys::session_by_socket(session.connection_id),
                    session.id.to_string(),
                    self.mirror_ttl,
                ),
                CacheOp::set(keys::session_by_user(session.user_id), pointer, self.mirror_ttl),
                CacheOp::set(keys::session_details(session.id), snapshot, self.mirror_ttl),
            ])
            .await
    }

    /// Clear the three mirror keys of a session. The user pointer is only
    /// removed while it still names this session.
    async fn clear_mirror(&self, session: &Session) {
        let pointer = UserSessionPointer {
            session_id: session.id,
            connection_id: session.connection_id,
        };
        let pointer_json = match serde_json::to_string(&pointer) {
            Ok(json) => json,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Failed to encode session pointer");
                return;
            }
        };

        let socket_key = keys::session_by_socket(session.connection_id);
        let details_key = keys::session_details(session.id);
        let user_key = keys::session_by_user(session.user_id);

        let batch = vec![
            CacheOp::delete(socket_key.clone()),
            CacheOp::delete(details_key.clone()),
            CacheOp::delete_if_equals(user_key.clone(), pointer_json.clone()),
        ];
        let Err(e) = self.cache.apply_batch(batch).await else {
            return;
        };
        warn!(session_id = %session.id, error = %e, "Atomic mirror clear failed, deleting per key");

        for key in [&socket_key, &details_key] {
            if let Err(e) = self.cache.delete(key).await {
                warn!(session_id = %session.id, key = %key, error = %e, "Failed to delete mirror key");
            }
        }
        match self.cache.get(&user_key).await {
            Ok(Some(current)) if current == pointer_json => {
                if let Err(e) = self.cache.delete(&user_key).await {
                    warn!(session_id = %session.id, key = %user_key, error = %e, "Failed to delete mirror key");
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(session_id = %session.id, key = %user_key, error = %e, "Failed to read mirror key");
            }
        }
    }

    /// Resolve the session id bound to a connection, preferring the mirror.
    async fn resolve_connection(&self, connection_id: ConnectionId) -> AppResult<Option<SessionId>> {
        match self.cache.get(&keys::session_by_socket(connection_id)).await {
            Ok(Some(raw)) => match raw.parse::<SessionId>() {
                Ok(id) => return Ok(Some(id)),
                Err(_) => warn!(connection_id = %connection_id, "Unreadable socket mirror entry"),
            },
            Ok(None) => {}
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "Socket mirror lookup failed");
            }
        }
        Ok(self
            .repo
            .find_active_by_connection(connection_id)
            .await?
            .map(|s| s.id))
    }

    /// The active session bound to a connection.
    pub async fn session_for_connection(
        &self,
        connection_id: ConnectionId,
    ) -> AppResult<Option<Session>> {
        let Some(id) = self.resolve_connection(connection_id).await? else {
            return Ok(None);
        };
        Ok(self.repo.find_by_id(id).await?.filter(|s| s.is_active))
    }

    /// End the session bound to a connection. Returns `None` if there was none.
    pub async fn end_session_by_connection_id(
        &self,
        connection_id: ConnectionId,
    ) -> AppResult<Option<Session>> {
        match self.resolve_connection(connection_id).await? {
            Some(id) => self.end_session_by_id(id).await,
            None => {
                debug!(connection_id = %connection_id, "No session to end for connection");
                Ok(None)
            }
        }
    }

    /// Mark a session ended and clear its mirror. Ending twice is harmless
    /// and keeps the first `ended_at`.
    pub async fn end_session_by_id(&self, session_id: SessionId) -> AppResult<Option<Session>> {
        let Some(session) = self.repo.end(session_id, Utc::now()).await? else {
            return Ok(None);
        };
        self.clear_mirror(&session).await;
        info!(
            session_id = %session.id,
            user_id = %session.user_id,
            "Session ended"
        );
        Ok(Some(session))
    }

    /// End every active session of a user. Returns the sessions ended.
    pub async fn end_all_user_sessions(&self, user_id: UserId) -> AppResult<Vec<Session>> {
        let ended = self.repo.end_all_for_user(user_id, Utc::now()).await?;
        for session in &ended {
            self.clear_mirror(session).await;
        }
        // Catch a pointer left behind by a session that was already ended.
        if let Err(e) = self.cache.delete(&keys::session_by_user(user_id)).await {
            warn!(user_id = %user_id, error = %e, "Failed to delete user session pointer");
        }
        info!(user_id = %user_id, count = ended.len(), "Ended all user sessions");
        Ok(ended)
    }

    /// End every active session idle for longer than `inactive_for`.
    /// Returns the sessions ended so callers can drop their connections.
    pub async fn cleanup_expired_sessions(
        &self,
        inactive_for: chrono::Duration,
    ) -> AppResult<Vec<Session>> {
        let now = Utc::now();
        let ended = self.repo.end_stale(now - inactive_for, now).await?;
        for session in &ended {
            self.clear_mirror(session).await;
        }
        if !ended.is_empty() {
            info!(count = ended.len(), "Ended stale sessions");
        }
        Ok(ended)
    }

    /// Delete ended sessions older than the retention window.
    pub async fn purge_ended_sessions(&self) -> AppResult<u64> {
        let purged = self
            .repo
            .purge_ended_before(Utc::now() - self.retention)
            .await?;
        if purged > 0 {
            info!(purged, "Purged ended sessions past retention");
        }
        Ok(purged)
    }

    /// Remove mirrors whose durable record is missing or no longer active.
    pub async fn reconcile_mirrors(&self) -> AppResult<ReconcileReport> {
        let detail_keys = self.cache.scan_keys(keys::session_details_pattern()).await?;
        let mut report = ReconcileReport {
            scanned: detail_keys.len(),
            removed: 0,
        };

        for key in detail_keys {
            let Some(session_id) = keys::session_id_from_details_key(&key) else {
                continue;
            };
            match self.repo.find_by_id(session_id).await? {
                Some(session) if session.is_active => {}
                Some(session) => {
                    self.clear_mirror(&session).await;
                    report.removed += 1;
                }
                None => {
                    self.clear_orphan(&key, session_id).await;
                    report.removed += 1;
                }
            }
        }

        if report.removed > 0 {
            info!(
                scanned = report.scanned,
                removed = report.removed,
                "Reconciled session mirrors"
            );
        }
        Ok(report)
    }

    /// Clear a mirror with no durable record, using its snapshot to find the
    /// sibling keys.
    async fn clear_orphan(&self, details_key: &str, session_id: SessionId) {
        let snapshot: Option<SessionSnapshot> = match self.cache.get_json(details_key).await {
            Ok(s) => s,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Unreadable session snapshot");
                None
            }
        };
        let Some(snapshot) = snapshot else {
            if let Err(e) = self.cache.delete(details_key).await {
                warn!(session_id = %session_id, error = %e, "Failed to delete orphan snapshot");
            }
            return;
        };
        let orphan = Session {
            id: snapshot.session_id,
            user_id: snapshot.user_id,
            connection_id: snapshot.connection_id,
            user_agent: snapshot.user_agent,
            ip_address: snapshot.ip_address,
            created_at: snapshot.created_at,
            last_activity: snapshot.created_at,
            is_active: false,
            ended_at: None,
        };
        self.clear_mirror(&orphan).await;
    }

    /// Active sessions of a user, newest first.
    pub async fn list_active_for_user(&self, user_id: UserId) -> AppResult<Vec<Session>> {
        self.repo.find_active_by_user(user_id).await
    }

    /// End one of the caller's own sessions.
    pub async fn end_session_for_user(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> AppResult<Session> {
        match self.repo.find_by_id(session_id).await? {
            Some(s) if s.user_id == user_id && s.is_active => {}
            _ => return Err(AppError::not_found("Session not found")),
        }
        self.end_session_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::not_found("Session not found"))
    }

    /// End every active session of a user except `keep`.
    pub async fn end_other_sessions(
        &self,
        user_id: UserId,
        keep: Option<SessionId>,
    ) -> AppResult<Vec<Session>> {
        let mut ended = Vec::new();
        for session in self.repo.find_active_by_user(user_id).await? {
            if Some(session.id) == keep {
                continue;
            }
            if let Some(s) = self.end_session_by_id(session.id).await? {
                ended.push(s);
            }
        }
        Ok(ended)
    }

    /// Record activity on a session.
    pub async fn touch(&self, session_id: SessionId) -> AppResult<bool> {
        self.repo.touch(session_id, Utc::now()).await
    }

    pub async fn count_active(&self) -> AppResult<i64> {
        self.repo.count_active().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_cache::memory::MemoryCacheProvider;
    use chorus_core::ErrorKind;
    use chorus_core::config::cache::MemoryCacheConfig;
    use chorus_database::MemorySessionRepository;

    struct Fixture {
        registry: SessionRegistry,
        repo: Arc<MemorySessionRepository>,
        cache: Arc<CacheManager>,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(CacheManager::from_provider(Arc::new(
            MemoryCacheProvider::new(&MemoryCacheConfig { max_capacity: 10_000 }),
        )));
        let repo = Arc::new(MemorySessionRepository::new());
        let registry = SessionRegistry::new(&SessionConfig::default(), repo.clone(), cache.clone());
        Fixture {
            registry,
            repo,
            cache,
        }
    }

    async fn mirror_keys(cache: &CacheManager) -> Vec<String> {
        let mut keys = cache.scan_keys("sessions:*").await.unwrap();
        keys.sort();
        keys
    }

    async fn open(f: &Fixture, user: UserId) -> Session {
        f.registry
            .create_session(
                user,
                ConnectionId::new(),
                Some("test-agent".to_string()),
                Some("10.0.0.1".to_string()),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_writes_three_mirror_keys() {
        let f = fixture();
        let user = UserId::new();
        let s = open(&f, user).await;

        assert_eq!(
            f.cache.get(&keys::session_by_socket(s.connection_id)).await.unwrap(),
            Some(s.id.to_string())
        );
        let pointer: UserSessionPointer = f
            .cache
            .get_json(&keys::session_by_user(user))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pointer.session_id, s.id);
        assert_eq!(mirror_keys(&f.cache).await.len(), 3);
    }

    #[tokio::test]
    async fn test_end_by_id_leaves_no_residual_keys() {
        let f = fixture();
        let s = open(&f, UserId::new()).await;

        let ended = f.registry.end_session_by_id(s.id).await.unwrap().unwrap();
        assert!(!ended.is_active);
        assert!(ended.ended_at.is_some());
        assert!(mirror_keys(&f.cache).await.is_empty());

        let stored = f.repo.find_by_id(s.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn test_end_by_connection_falls_back_to_repository() {
        let f = fixture();
        let s = open(&f, UserId::new()).await;
        f.cache.flush_all().await.unwrap();

        let ended = f
            .registry
            .end_session_by_connection_id(s.connection_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ended.id, s.id);
        assert!(!ended.is_active);
    }

    #[tokio::test]
    async fn test_older_session_end_keeps_newer_user_pointer() {
        let f = fixture();
        let user = UserId::new();
        let older = open(&f, user).await;
        let newer = open(&f, user).await;

        f.registry.end_session_by_id(older.id).await.unwrap();
        let pointer: UserSessionPointer = f
            .cache
            .get_json(&keys::session_by_user(user))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pointer.session_id, newer.id);
    }

    #[tokio::test]
    async fn test_end_all_user_sessions() {
        let f = fixture();
        let alice = UserId::new();
        let s1 = open(&f, alice).await;
        let s2 = open(&f, alice).await;
        let other = open(&f, UserId::new()).await;

        let ended = f.registry.end_all_user_sessions(alice).await.unwrap();
        assert_eq!(ended.len(), 2);
        for id in [s1.id, s2.id] {
            assert!(!f.repo.find_by_id(id).await.unwrap().unwrap().is_active);
            assert!(!f.cache.exists(&keys::session_details(id)).await.unwrap());
        }
        assert!(f.cache.exists(&keys::session_details(other.id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_ends_sessions_without_disconnect() {
        let f = fixture();
        let idle = open(&f, UserId::new()).await;
        let live = open(&f, UserId::new()).await;
        f.repo
            .set_last_activity(idle.id, Utc::now() - chrono::Duration::hours(3))
            .await;

        let ended = f
            .registry
            .cleanup_expired_sessions(f.registry.idle_timeout())
            .await
            .unwrap();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].id, idle.id);
        assert!(!f.cache.exists(&keys::session_details(idle.id)).await.unwrap());
        assert!(f.repo.find_by_id(live.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_reconcile_removes_orphaned_mirrors() {
        let f = fixture();
        let s = open(&f, UserId::new()).await;
        let kept = open(&f, UserId::new()).await;
        // Durable record ends without the mirror being cleared.
        f.repo.end(s.id, Utc::now()).await.unwrap();

        let report = f.registry.reconcile_mirrors().await.unwrap();
        assert_eq!(report, ReconcileReport { scanned: 2, removed: 1 });
        assert!(
            !f.cache
                .exists(&keys::session_by_socket(s.connection_id))
                .await
                .unwrap()
        );
        assert!(f.cache.exists(&keys::session_details(kept.id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_end_session_for_user_checks_ownership() {
        let f = fixture();
        let alice = UserId::new();
        let s = open(&f, alice).await;

        let err = f
            .registry
            .end_session_for_user(UserId::new(), s.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        f.registry.end_session_for_user(alice, s.id).await.unwrap();
        let err = f
            .registry
            .end_session_for_user(alice, s.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_end_other_sessions_keeps_current() {
        let f = fixture();
        let alice = UserId::new();
        let current = open(&f, alice).await;
        open(&f, alice).await;
        open(&f, alice).await;

        let ended = f
            .registry
            .end_other_sessions(alice, Some(current.id))
            .await
            .unwrap();
        assert_eq!(ended.len(), 2);
        let active = f.registry.list_active_for_user(alice).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, current.id);
    }
}
