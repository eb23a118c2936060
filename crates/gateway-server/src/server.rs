//! HTTP server runner.

use std::future::{Future, IntoFuture};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::routes::create_router;
use crate::shutdown::{shutdown_signal, ShutdownPhase};
use crate::state::AppState;

/// Server failure
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Could not bind the listen address
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Address that failed
        address: String,
        /// Underlying error
        source: std::io::Error,
    },
    /// Accept loop failed
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// The gateway HTTP server
#[derive(Debug, Clone)]
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a server over prepared state
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Shared state
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind the configured address and serve until SIGINT/SIGTERM
    pub async fn run(self) -> Result<(), ServerError> {
        let address = self.state.config().server.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind { address, source })?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `signal` resolves, then drain.
    ///
    /// `signal` yields the shutdown reason for the log.
    pub async fn serve<F>(self, listener: TcpListener, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = String> + Send + 'static,
    {
        let coordinator = Arc::clone(self.state.shutdown());
        info!(
            address = %listener.local_addr()?,
            provider = %self.state.provider_id(),
            "Gateway listening"
        );

        let trigger = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                let reason = signal.await;
                coordinator.begin_shutdown(&reason);
            })
        };

        let graceful = {
            let coordinator = Arc::clone(&coordinator);
            async move { coordinator.wait_for_shutdown().await }
        };
        let server = axum::serve(listener, create_router(self.state.clone()))
            .with_graceful_shutdown(graceful)
            .into_future();

        let result = tokio::select! {
            result = server => result.map_err(ServerError::Io),
            () = coordinator.drain_deadline() => {
                if coordinator.current_phase() == ShutdownPhase::ForceClose {
                    warn!("Closing connections with requests still in flight");
                } else {
                    info!("Requests drained, closing idle connections");
                }
                Ok(())
            }
        };

        trigger.abort();
        coordinator.complete();
        result
    }
}
