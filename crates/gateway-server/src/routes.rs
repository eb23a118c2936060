//! Route definitions for the gateway API.

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{auth, handlers, middleware, state::AppState};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config().server.body_limit_bytes;

    let protected = Router::new()
        .nest("/v1", openai_routes())
        .nest("/admin", admin_routes())
        .route_layer(from_fn_with_state(state.clone(), auth::auth_middleware))
        .route_layer(from_fn_with_state(state.clone(), middleware::track_in_flight));

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/healthz", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/readyz", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        .route("/livez", get(handlers::liveness_check))
        // Metrics endpoint
        .route("/metrics", get(handlers::metrics_endpoint))
        .merge(protected)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// OpenAI-compatible API routes
fn openai_routes() -> Router<AppState> {
    Router::new()
        .route("/chat/completions", post(handlers::chat_completion))
        .route("/models", get(handlers::list_models))
        .route("/models/:model_id", get(handlers::get_model))
}

/// Admin/management routes
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(handlers::admin_status))
        .route("/usage", get(handlers::admin_usage))
        .route("/alerts", get(handlers::admin_alerts))
}
