//! Liveness and readiness probes.
//!
//! - Liveness: the process is up and serving
//! - Readiness: the gateway accepts new traffic; false once draining starts

use crate::shutdown::{ShutdownCoordinator, ShutdownPhase};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Serving normally
    Healthy,
    /// Draining for shutdown
    Draining,
}

impl HealthStatus {
    /// HTTP status code for this health status
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Healthy => 200,
            Self::Draining => 503,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Draining => write!(f, "draining"),
        }
    }
}

/// Summary returned by `/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status
    pub status: HealthStatus,
    /// Gateway version
    pub version: &'static str,
    /// Seconds since startup
    pub uptime_seconds: u64,
    /// HTTP requests currently being served
    pub in_flight: u64,
    /// Upstream provider ID
    pub provider: String,
}

/// Liveness response
#[derive(Debug, Clone, Serialize)]
pub struct LivenessResponse {
    /// Status
    pub status: &'static str,
}

/// Readiness response
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Ready status
    pub ready: bool,
    /// Reason if not ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Answers the health probes
#[derive(Debug)]
pub struct HealthChecker {
    startup_time: Instant,
    shutdown: Arc<ShutdownCoordinator>,
}

impl HealthChecker {
    /// Create a health checker tied to the shutdown coordinator
    #[must_use]
    pub fn new(shutdown: Arc<ShutdownCoordinator>) -> Self {
        Self {
            startup_time: Instant::now(),
            shutdown,
        }
    }

    /// Time since startup
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.startup_time.elapsed()
    }

    /// Current overall status
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        if self.shutdown.is_shutting_down() {
            HealthStatus::Draining
        } else {
            HealthStatus::Healthy
        }
    }

    /// Full health summary
    #[must_use]
    pub fn check_health(&self, provider: &str) -> HealthResponse {
        HealthResponse {
            status: self.status(),
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: self.uptime().as_secs(),
            in_flight: self.shutdown.in_flight_count(),
            provider: provider.to_string(),
        }
    }

    /// Liveness probe; still passes while draining
    #[must_use]
    pub fn check_liveness(&self) -> LivenessResponse {
        LivenessResponse {
            status: if self.shutdown.is_shutting_down() {
                "shutting_down"
            } else {
                "alive"
            },
        }
    }

    /// Readiness probe
    #[must_use]
    pub fn check_readiness(&self) -> ReadinessResponse {
        match self.shutdown.current_phase() {
            ShutdownPhase::Running => ReadinessResponse {
                ready: true,
                reason: None,
            },
            phase => ReadinessResponse {
                ready: false,
                reason: Some(format!("shutting down ({phase})")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownConfig;

    fn checker() -> (HealthChecker, Arc<ShutdownCoordinator>) {
        let shutdown = Arc::new(ShutdownCoordinator::new(ShutdownConfig::default()));
        (HealthChecker::new(Arc::clone(&shutdown)), shutdown)
    }

    #[test]
    fn test_ready_while_running() {
        let (checker, _) = checker();
        let readiness = checker.check_readiness();
        assert!(readiness.ready);
        assert!(readiness.reason.is_none());
        assert_eq!(checker.status(), HealthStatus::Healthy);
        assert_eq!(checker.check_liveness().status, "alive");
    }

    #[test]
    fn test_not_ready_while_draining() {
        let (checker, shutdown) = checker();
        shutdown.begin_shutdown("test");

        let readiness = checker.check_readiness();
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("shutting down (draining)"));
        assert_eq!(checker.status().http_status_code(), 503);
        assert_eq!(checker.check_liveness().status, "shutting_down");
    }

    #[test]
    fn test_health_summary() {
        let (checker, _) = checker();
        let health = checker.check_health("upstream");
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.provider, "upstream");
        assert_eq!(health.in_flight, 0);

        let json = serde_json::to_value(&health).expect("json");
        assert_eq!(json["status"], "healthy");
    }
}
