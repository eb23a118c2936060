//! Request lifecycle middleware.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;
use crate::shutdown::RequestGuard;
use crate::state::AppState;

/// Counts the request as in flight for shutdown draining; refuses new
/// requests with 503 once draining has started
pub async fn track_in_flight(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(_guard) = RequestGuard::new(Arc::clone(state.shutdown())) else {
        debug!(path = %request.uri().path(), "Refusing request while draining");
        return ApiError::unavailable("Gateway is shutting down").into_response();
    };
    next.run(request).await
}
