//! Health check handler.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::warn;

use chorus_core::traits::cache::CacheProvider;
use chorus_core::types::ApiResponse;

use crate::dto::response::HealthResponse;
use crate::state::AppState;

/// GET /health
///
/// 200 when the cache and database answer, 503 otherwise. Fanout
/// degradation is reported but does not fail the check.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let cache = match state.cache.health_check().await {
        Ok(healthy) => healthy,
        Err(e) => {
            warn!(error = %e, "Cache health check failed");
            false
        }
    };

    let database = match &state.database {
        Some(db) => Some(match db.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                false
            }
        }),
        None => None,
    };

    let healthy = cache && database.unwrap_or(true);
    let engine = &state.realtime;
    let body = HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        node_id: engine.fanout.node_id().to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        cache,
        database,
        connections: engine.pool.len(),
        online_users: engine.online.count(),
        fanout_degraded: engine.fanout.is_degraded(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ApiResponse::ok(body)))
}
