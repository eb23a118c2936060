//! Caller identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-principal rate overrides. Unset fields fall back to the defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalLimits {
    /// Requests per minute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<u64>,
    /// Requests per hour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_hour: Option<u64>,
    /// Requests per day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_day: Option<u64>,
    /// In-flight requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<u32>,
}

/// The authenticated caller that per-user limits and budgets are keyed by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    id: String,
    limits: Option<PrincipalLimits>,
}

impl Principal {
    /// Principal with default limits
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            limits: None,
        }
    }

    /// Attach rate overrides
    #[must_use]
    pub fn with_limits(mut self, limits: PrincipalLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Rate overrides, if any
    #[must_use]
    pub fn limits(&self) -> Option<&PrincipalLimits> {
        self.limits.as_ref()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
