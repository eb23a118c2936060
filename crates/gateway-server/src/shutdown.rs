//! Graceful shutdown coordination.
//!
//! On a signal the coordinator moves to `Draining`: readiness starts failing,
//! new API requests are refused with 503, and in-flight requests get up to
//! `graceful_timeout` to finish before the server stops waiting for them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Graceful shutdown configuration
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Maximum time to wait for in-flight requests to complete
    pub graceful_timeout: Duration,
    /// Interval between drain progress logs
    pub progress_interval: Duration,
    /// Refuse new requests once draining
    pub reject_new_requests: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(30),
            progress_interval: Duration::from_secs(1),
            reject_new_requests: true,
        }
    }
}

impl ShutdownConfig {
    /// Set the graceful timeout
    #[must_use]
    pub fn with_graceful_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_timeout = timeout;
        self
    }

    /// Set whether to reject new requests during shutdown
    #[must_use]
    pub fn with_reject_new_requests(mut self, reject: bool) -> Self {
        self.reject_new_requests = reject;
        self
    }
}

/// Shutdown phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Normal operation
    Running,
    /// Signal received, waiting for in-flight requests
    Draining,
    /// Drain deadline passed with requests still open
    ForceClose,
    /// Shutdown complete
    Complete,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::ForceClose => write!(f, "force_close"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Tracks shutdown phase and in-flight HTTP requests
#[derive(Debug)]
pub struct ShutdownCoordinator {
    config: ShutdownConfig,
    phase: watch::Sender<ShutdownPhase>,
    in_flight_requests: AtomicU64,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    #[must_use]
    pub fn new(config: ShutdownConfig) -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        Self {
            config,
            phase,
            in_flight_requests: AtomicU64::new(0),
        }
    }

    /// Check if shutdown is in progress
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.current_phase() != ShutdownPhase::Running
    }

    /// Current shutdown phase
    #[must_use]
    pub fn current_phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    /// Number of in-flight requests
    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight_requests.load(Ordering::SeqCst)
    }

    /// Subscribe to phase changes
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase.subscribe()
    }

    /// Should accept new requests?
    #[must_use]
    pub fn should_accept_requests(&self) -> bool {
        !self.config.reject_new_requests || !self.is_shutting_down()
    }

    /// Enter the draining phase. Later calls are ignored.
    pub fn begin_shutdown(&self, reason: &str) {
        let started = self.phase.send_if_modified(|phase| {
            if *phase == ShutdownPhase::Running {
                *phase = ShutdownPhase::Draining;
                true
            } else {
                false
            }
        });
        if started {
            info!(
                reason = %reason,
                in_flight = self.in_flight_count(),
                "Initiating graceful shutdown"
            );
        } else {
            debug!("Shutdown already triggered");
        }
    }

    /// Resolves once shutdown has begun
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.phase.subscribe();
        // Sender lives in self, so the channel cannot close here.
        let _ = rx.wait_for(|phase| *phase != ShutdownPhase::Running).await;
    }

    /// Resolves when the drain deadline passes after shutdown begins
    pub async fn drain_deadline(&self) {
        self.wait_for_shutdown().await;
        if timeout(self.config.graceful_timeout, self.wait_for_drain())
            .await
            .is_err()
        {
            warn!(
                remaining = self.in_flight_count(),
                "Graceful timeout exceeded, forcing shutdown"
            );
            self.set_phase(ShutdownPhase::ForceClose);
        }
        // Leave a moment for responses of just-finished requests to flush.
        sleep(Duration::from_millis(50)).await;
    }

    /// Mark shutdown as complete
    pub fn complete(&self) {
        self.set_phase(ShutdownPhase::Complete);
        info!("Graceful shutdown complete");
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        info!(phase = %phase, "Shutdown phase changed");
        self.phase.send_replace(phase);
    }

    async fn wait_for_drain(&self) {
        let mut last_logged = tokio::time::Instant::now();

        loop {
            let count = self.in_flight_count();
            if count == 0 {
                info!("All in-flight requests completed");
                break;
            }

            if last_logged.elapsed() >= self.config.progress_interval {
                info!(remaining = count, "Waiting for in-flight requests");
                last_logged = tokio::time::Instant::now();
            }

            sleep(Duration::from_millis(50)).await;
        }
    }

    fn request_start(&self) {
        self.in_flight_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn request_complete(&self) {
        self.in_flight_requests.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(ShutdownConfig::default())
    }
}

/// Counts one HTTP request as in flight until dropped
#[derive(Debug)]
pub struct RequestGuard {
    coordinator: Arc<ShutdownCoordinator>,
}

impl RequestGuard {
    /// Register a request, or `None` when new requests are being refused.
    ///
    /// The request is counted before the phase is checked, so a drain that
    /// has seen zero in-flight requests never gains one afterwards.
    #[must_use]
    pub fn new(coordinator: Arc<ShutdownCoordinator>) -> Option<Self> {
        coordinator.request_start();
        if !coordinator.should_accept_requests() {
            coordinator.request_complete();
            return None;
        }
        Some(Self { coordinator })
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.coordinator.request_complete();
    }
}

/// Wait for SIGINT/SIGTERM (or Ctrl+C) and return the signal name
///
/// # Panics
/// Panics if signal handlers cannot be installed
#[allow(clippy::expect_used)]
pub async fn shutdown_signal() -> String {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        "ctrl+c"
    };

    #[cfg(unix)]
    let sigterm = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
        "sigterm"
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<&str>();

    let signal_name = tokio::select! {
        name = ctrl_c => name,
        name = sigterm => name,
    };

    info!(signal = signal_name, "Received shutdown signal");
    signal_name.to_string()
}
