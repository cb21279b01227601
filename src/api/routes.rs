use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;
use crate::triggers::{
    get_history, get_notification, get_stats, retry_notification, send_notification,
};

use super::health::health;
use super::metrics::prometheus_metrics;
use super::template::{
    create_template, delete_template, get_template, list_templates, render_template,
    update_template,
};

/// Open routes: health, metrics and the caller-facing notification API
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                .route("/notifications/send", post(send_notification))
                .route("/notifications/history/{recipient_id}", get(get_history))
                .route("/notifications/{id}", get(get_notification)),
        )
}

/// Routes guarded by `X-API-Key`
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/notifications/stats", get(get_stats))
        .route("/api/v1/notifications/retry/{id}", post(retry_notification))
        .route("/api/v1/templates", get(list_templates).post(create_template))
        .route(
            "/api/v1/templates/{id}",
            get(get_template).put(update_template).delete(delete_template),
        )
        .route("/api/v1/templates/{id}/render", post(render_template))
}
