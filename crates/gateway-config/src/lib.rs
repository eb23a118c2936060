//! # Gateway Config
//!
//! Configuration for the LLM policy gateway.
//!
//! Configuration is assembled once at startup and is immutable afterwards:
//! built-in defaults, then an optional YAML/TOML/JSON file, then environment
//! overrides, then validation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod env;
pub mod error;
pub mod loader;

pub use config::{
    AuthConfig, BudgetConfig, GatewayConfig, GuardrailConfig, LogFormat, ModelConfig,
    NamedPattern, PeriodCeilings, RateLimitConfig, ServerConfig, TelemetryConfig,
    ThresholdConfig, UpstreamConfig, WindowLimits,
};
pub use env::apply_env_overrides;
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_with, parse_file, validate_config};
