//! Application state shared across all handlers.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use chorus_auth::{AccountService, SessionRegistry, TokenService};
use chorus_cache::CacheManager;
use chorus_core::config::AppConfig;
use chorus_core::error::AppError;
use chorus_core::result::AppResult;
use chorus_database::{
    DatabasePool, MemorySessionRepository, MemoryUserRepository, PgSessionRepository,
    PgUserRepository, SessionRepository, UserRepository,
};
use chorus_realtime::RealtimeEngine;

/// Application state containing all shared dependencies.
///
/// Passed to every handler via `State<AppState>`. All fields are cheap to
/// clone.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub cache: Arc<CacheManager>,
    /// `None` when running on the in-memory store.
    pub database: Option<DatabasePool>,
    pub tokens: Arc<TokenService>,
    pub sessions: Arc<SessionRegistry>,
    pub accounts: Arc<AccountService>,
    pub realtime: RealtimeEngine,
    pub started_at: Instant,
}

impl AppState {
    /// Connect the configured backends and wire every service.
    pub async fn build(config: AppConfig) -> AppResult<Self> {
        let cache = Arc::new(CacheManager::new(&config.cache).await?);

        let (database, users, sessions_repo): (
            Option<DatabasePool>,
            Arc<dyn UserRepository>,
            Arc<dyn SessionRepository>,
        ) = match config.database.backend.as_str() {
            "postgres" => {
                let db = DatabasePool::connect_and_migrate(&config.database).await?;
                let users = Arc::new(PgUserRepository::new(db.pool().clone()));
                let sessions = Arc::new(PgSessionRepository::new(db.pool().clone()));
                (Some(db), users, sessions)
            }
            "memory" => {
                info!("Using in-memory store; accounts and sessions are not durable");
                (
                    None,
                    Arc::new(MemoryUserRepository::new()),
                    Arc::new(MemorySessionRepository::new()),
                )
            }
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown database backend '{other}'"
                )));
            }
        };

        Self::assemble(config, cache, database, users, sessions_repo)
    }

    /// Wire services over already-built storage.
    pub fn assemble(
        config: AppConfig,
        cache: Arc<CacheManager>,
        database: Option<DatabasePool>,
        users: Arc<dyn UserRepository>,
        sessions_repo: Arc<dyn SessionRepository>,
    ) -> AppResult<Self> {
        let tokens = Arc::new(TokenService::new(
            &config.auth,
            Arc::clone(&cache),
            Arc::clone(&users),
        ));
        let sessions = Arc::new(SessionRegistry::new(
            &config.session,
            sessions_repo,
            Arc::clone(&cache),
        ));
        let accounts = Arc::new(AccountService::new(
            &config.auth,
            users,
            Arc::clone(&tokens),
            Arc::clone(&sessions),
        ));
        let realtime = RealtimeEngine::new(
            &config.realtime,
            &config.session,
            Arc::clone(&tokens),
            Arc::clone(&sessions),
            &cache,
        )?;

        Ok(Self {
            config: Arc::new(config),
            cache,
            database,
            tokens,
            sessions,
            accounts,
            realtime,
            started_at: Instant::now(),
        })
    }
}
