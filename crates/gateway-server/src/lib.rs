//! # Gateway Server
//!
//! The policy pipeline and its HTTP surface.
//!
//! This crate provides:
//! - [`GatewayPipeline`], which runs admission, guardrails, budgets, the
//!   upstream call, cost recording and metrics for each request
//! - An Axum server with OpenAI-compatible endpoints
//! - Bearer-key authentication
//! - Health probes and graceful shutdown

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod pipeline;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod state;

// Re-export main types
pub use auth::{AuthError, AuthenticatedKey, Authenticator};
pub use error::ApiError;
pub use health::{HealthChecker, HealthStatus};
pub use pipeline::{GatewayPipeline, RequestEnvelope};
pub use routes::create_router;
pub use server::{Server, ServerError};
pub use shutdown::{RequestGuard, ShutdownConfig, ShutdownCoordinator, ShutdownPhase};
pub use state::AppState;
