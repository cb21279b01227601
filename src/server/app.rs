use axum::{middleware, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::api::{admin_routes, api_routes};

use super::middleware::api_key_auth;
use super::AppState;

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin = admin_routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        api_key_auth,
    ));

    Router::new()
        .merge(api_routes())
        .merge(admin)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
