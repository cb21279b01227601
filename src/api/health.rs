//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::notification::DispatcherStatsSnapshot;
use crate::redis::{RedisHealthStats, RedisHealthStatus};
use crate::server::AppState;
use crate::transport::TransportStatus;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub storage: StorageHealthResponse,
    pub transports: Vec<TransportStatus>,
    pub events: EventBusHealthResponse,
    pub dispatcher: DispatcherStatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct StorageHealthResponse {
    pub templates: String,
    pub ledger: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresHealthResponse>,
}

#[derive(Debug, Serialize)]
pub struct PostgresHealthResponse {
    pub connected: bool,
    pub pool_size: u32,
    pub idle_connections: u32,
}

#[derive(Debug, Serialize)]
pub struct EventBusHealthResponse {
    pub connected: bool,
    #[serde(flatten)]
    pub subscriber: RedisHealthStats,
}

/// GET /health
///
/// `degraded` when the event subscriber is reconnecting or the database does
/// not answer. A disabled subscriber does not degrade the service.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let redis_health = state.redis_health.stats();

    let postgres = match state.postgres_pool {
        Some(ref pool) => {
            let inner_pool = pool.pool();
            Some(PostgresHealthResponse {
                connected: pool.ping().await,
                pool_size: inner_pool.size(),
                idle_connections: inner_pool.num_idle() as u32,
            })
        }
        None => None,
    };

    let degraded = redis_health.status == RedisHealthStatus::Reconnecting
        || postgres.as_ref().is_some_and(|p| !p.connected);
    let status = if degraded { "degraded" } else { "healthy" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        storage: StorageHealthResponse {
            templates: state.template_store.backend_type().to_string(),
            ledger: state.ledger.backend_type().to_string(),
            postgres,
        },
        transports: state.dispatcher.transports().status(),
        events: EventBusHealthResponse {
            connected: redis_health.status == RedisHealthStatus::Healthy,
            subscriber: redis_health,
        },
        dispatcher: state.dispatcher.stats(),
    })
}
