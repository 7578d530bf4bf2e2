//! Top-level real-time engine that ties together all subsystems.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use chorus_auth::{SessionRegistry, TokenService};
use chorus_cache::CacheManager;
use chorus_core::config::realtime::RealtimeConfig;
use chorus_core::config::session::SessionConfig;
use chorus_core::error::AppError;
use chorus_core::result::AppResult;

use crate::channel::ChannelRegistry;
use crate::connection::ConnectionPool;
use crate::fanout::{FanoutAdapter, FanoutBackend, MemoryFanoutBackend};
use crate::gateway::{Gateway, GatewayComponents};
use crate::metrics::RealtimeMetrics;
use crate::presence::{MemoryPresenceStore, OnlineTracker, PresenceStore};

/// Central real-time engine that coordinates all socket subsystems.
#[derive(Clone)]
pub struct RealtimeEngine {
    pub gateway: Arc<Gateway>,
    pub pool: Arc<ConnectionPool>,
    pub channels: Arc<ChannelRegistry>,
    pub presence: Arc<dyn PresenceStore>,
    pub online: Arc<OnlineTracker>,
    pub fanout: Arc<FanoutAdapter>,
    pub metrics: Arc<RealtimeMetrics>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine")
            .field("node_id", &self.fanout.node_id())
            .finish_non_exhaustive()
    }
}

impl RealtimeEngine {
    /// Build the engine with the fanout backend named in configuration.
    pub fn new(
        config: &RealtimeConfig,
        session: &SessionConfig,
        tokens: Arc<TokenService>,
        sessions: Arc<SessionRegistry>,
        cache: &CacheManager,
    ) -> AppResult<Self> {
        let backend = fanout_backend(config, cache)?;
        Ok(Self::with_backend(config, session, tokens, sessions, backend))
    }

    /// Build the engine over an explicit fanout backend.
    pub fn with_backend(
        config: &RealtimeConfig,
        session: &SessionConfig,
        tokens: Arc<TokenService>,
        sessions: Arc<SessionRegistry>,
        backend: Arc<dyn FanoutBackend>,
    ) -> Self {
        let node_id = if config.node_id.trim().is_empty() {
            format!("node-{}", Uuid::new_v4().simple())
        } else {
            config.node_id.clone()
        };

        let metrics = Arc::new(RealtimeMetrics::new());
        let pool = Arc::new(ConnectionPool::new());
        let channels = Arc::new(ChannelRegistry::new());
        let presence: Arc<dyn PresenceStore> =
            Arc::new(MemoryPresenceStore::new(channels.clone()));
        let online = Arc::new(OnlineTracker::shared(
            Arc::clone(sessions.cache()),
            sessions.mirror_ttl(),
        ));
        let fanout = Arc::new(FanoutAdapter::new(
            node_id.clone(),
            config,
            backend,
            channels.clone(),
            pool.clone(),
            metrics.clone(),
        ));
        let gateway = Arc::new(Gateway::new(
            GatewayComponents {
                tokens,
                sessions,
                pool: pool.clone(),
                channels: channels.clone(),
                presence: presence.clone(),
                online: online.clone(),
                fanout: fanout.clone(),
                metrics: metrics.clone(),
            },
            config,
            session,
        ));

        info!(node_id = %node_id, backend = %config.fanout_backend, "Real-time engine initialized");

        Self {
            gateway,
            pool,
            channels,
            presence,
            online,
            fanout,
            metrics,
            shutdown: CancellationToken::new(),
        }
    }

    /// Start the fanout subscriber.
    pub fn start(&self) -> JoinHandle<()> {
        self.fanout.start(self.shutdown.child_token())
    }

    /// Stop the subscriber and close every connection.
    pub async fn shutdown(&self) {
        info!("Shutting down real-time engine");
        self.shutdown.cancel();
        self.gateway.shutdown().await;
        info!("Real-time engine shut down");
    }
}

#[cfg_attr(not(feature = "redis-pubsub"), allow(unused_variables))]
fn fanout_backend(config: &RealtimeConfig, cache: &CacheManager) -> AppResult<Arc<dyn FanoutBackend>> {
    match config.fanout_backend.as_str() {
        "memory" => Ok(Arc::new(MemoryFanoutBackend::new(
            config.outbound_buffer_size.max(16) * 4,
        ))),
        #[cfg(feature = "redis-pubsub")]
        "redis" => match cache.redis_client() {
            Some(client) => Ok(Arc::new(crate::fanout::RedisFanoutBackend::new(
                client.clone(),
            ))),
            None => Err(AppError::configuration(
                "The redis fanout backend requires cache.provider = \"redis\"",
            )),
        },
        other => Err(AppError::configuration(format!(
            "Unknown fanout backend: '{other}'. Supported: memory, redis"
        ))),
    }
}
