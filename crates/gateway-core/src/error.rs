//! Error taxonomy for the gateway.
//!
//! Every rejection the pipeline can produce is represented here so that the
//! HTTP layer can always hand the caller a structured reason.

use crate::time::BudgetPeriod;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result alias used across the gateway crates
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Scope a budget or rate counter applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// Process-wide counter
    Global,
    /// Counter for a single principal
    Principal(String),
    /// Counter for a single model (across all principals)
    Model(String),
}

impl Scope {
    /// Short label used in metrics and error bodies
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Principal(_) => "principal",
            Self::Model(_) => "model",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Principal(id) => write!(f, "principal:{id}"),
            Self::Model(name) => write!(f, "model:{name}"),
        }
    }
}

/// Stage at which a guardrail fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardrailStage {
    /// Inbound prompt
    Input,
    /// Generated completion
    Output,
}

impl fmt::Display for GuardrailStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Gateway error type
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// A rate or concurrency ceiling was hit
    #[error("Rate limit exceeded on {dimension}; retry after {retry_after_secs}s")]
    RateLimitExceeded {
        /// Seconds until the offending window rolls over
        retry_after_secs: u64,
        /// Human-readable name of the violated dimension
        dimension: String,
    },

    /// Content guardrail rejected the request or response
    #[error("Content policy violation ({stage}): {reason}")]
    GuardrailViolation {
        /// Stable reason code, e.g. "toxic"
        reason: String,
        /// Where the check ran
        stage: GuardrailStage,
        /// Extra detail for logs and the caller
        detail: String,
    },

    /// Spend is already at or above the emergency threshold
    #[error("Budget exceeded for {scope} ({period})")]
    BudgetExceeded {
        /// Scope whose budget is exhausted
        scope: Scope,
        /// Budget period
        period: BudgetPeriod,
    },

    /// Upstream provider returned an error
    #[error("Upstream error: {message}")]
    Upstream {
        /// Error message
        message: String,
        /// HTTP status from the provider, if any
        status_code: Option<u16>,
    },

    /// Upstream provider did not answer in time
    #[error("Upstream timed out after {}ms", timeout.as_millis())]
    UpstreamTimeout {
        /// Configured timeout
        timeout: Duration,
    },

    /// Missing price entry, unknown model, or invalid settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Credential check failed
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Malformed request
    #[error("Validation error: {message}")]
    Validation {
        /// Error message
        message: String,
        /// Offending field
        field: Option<String>,
    },

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Create a rate limit error
    pub fn rate_limited(retry_after_secs: u64, dimension: impl Into<String>) -> Self {
        Self::RateLimitExceeded {
            retry_after_secs,
            dimension: dimension.into(),
        }
    }

    /// Create a guardrail violation
    pub fn guardrail(
        stage: GuardrailStage,
        reason: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::GuardrailViolation {
            reason: reason.into(),
            stage,
            detail: detail.into(),
        }
    }

    /// Create an upstream error
    pub fn upstream(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::Upstream {
            message: message.into(),
            status_code,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Validation {
            message: message.into(),
            field: field.map(ToString::to_string),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status code reflecting the cause
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RateLimitExceeded { .. } | Self::BudgetExceeded { .. } => 429,
            Self::GuardrailViolation { .. }
            | Self::Validation { .. }
            | Self::Configuration(_) => 400,
            Self::Authentication(_) => 401,
            Self::Upstream { .. } => 502,
            Self::UpstreamTimeout { .. } => 504,
            Self::Internal(_) => 500,
        }
    }

    /// OpenAI-style error type string
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::GuardrailViolation { .. } => "policy_violation",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Upstream { .. } => "upstream_error",
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            Self::Configuration(_) => "configuration_error",
            Self::Authentication(_) => "authentication_error",
            Self::Validation { .. } => "invalid_request_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Retry hint, only set for rate limiting
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }
}
