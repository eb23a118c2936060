//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Config file could not be parsed
    #[error("Failed to parse config file {path}: {message}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// File extension is not one of yaml, yml, toml, json
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// Environment variable held an unparseable value
    #[error("Invalid value for {var}: {message}")]
    Env {
        /// Variable name
        var: String,
        /// What was wrong
        message: String,
    },

    /// Loaded configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

impl ConfigError {
    /// Create an env error
    pub fn env(var: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Env {
            var: var.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}
