//! Shared application state.

use crate::auth::Authenticator;
use crate::health::HealthChecker;
use crate::pipeline::GatewayPipeline;
use crate::shutdown::{ShutdownConfig, ShutdownCoordinator};
use gateway_config::GatewayConfig;
use gateway_core::{Clock, GatewayResult, InferenceProvider, SystemClock};
use std::sync::Arc;

/// State handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: Arc<GatewayConfig>,
    pipeline: GatewayPipeline,
    authenticator: Authenticator,
    health: HealthChecker,
    shutdown: Arc<ShutdownCoordinator>,
    provider_id: String,
}

impl AppState {
    /// Build state on the system clock
    ///
    /// # Errors
    /// Returns error if a policy component cannot be built from `config`
    pub fn new(config: GatewayConfig, provider: Arc<dyn InferenceProvider>) -> GatewayResult<Self> {
        Self::with_clock(config, provider, Arc::new(SystemClock))
    }

    /// Build state on an explicit clock
    ///
    /// # Errors
    /// Returns error if a policy component cannot be built from `config`
    pub fn with_clock(
        config: GatewayConfig,
        provider: Arc<dyn InferenceProvider>,
        clock: Arc<dyn Clock>,
    ) -> GatewayResult<Self> {
        let provider_id = provider.id().to_string();
        let pipeline = GatewayPipeline::from_config(&config, provider, clock)?;
        let shutdown = Arc::new(ShutdownCoordinator::new(
            ShutdownConfig::default().with_graceful_timeout(config.server.shutdown_timeout),
        ));

        Ok(Self {
            inner: Arc::new(Inner {
                authenticator: Authenticator::from_config(&config.auth),
                health: HealthChecker::new(Arc::clone(&shutdown)),
                config: Arc::new(config),
                pipeline,
                shutdown,
                provider_id,
            }),
        })
    }

    /// Immutable configuration
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Policy pipeline
    #[must_use]
    pub fn pipeline(&self) -> &GatewayPipeline {
        &self.inner.pipeline
    }

    /// Credential check
    #[must_use]
    pub fn authenticator(&self) -> &Authenticator {
        &self.inner.authenticator
    }

    /// Health probes
    #[must_use]
    pub fn health(&self) -> &HealthChecker {
        &self.inner.health
    }

    /// Shutdown coordinator
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.inner.shutdown
    }

    /// Upstream provider ID
    #[must_use]
    pub fn provider_id(&self) -> &str {
        &self.inner.provider_id
    }
}
