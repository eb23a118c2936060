//! Guardrail construction errors.

/// Result type for guardrail setup.
pub type Result<T> = std::result::Result<T, SecurityError>;

/// Errors raised while building guardrails from configuration.
///
/// Checks themselves never fail; they return a [`crate::Verdict`].
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    /// A configured regex does not compile.
    #[error("Invalid pattern '{name}': {source}")]
    InvalidPattern {
        /// Pattern name
        name: String,
        /// Compiler error
        #[source]
        source: regex::Error,
    },

    /// A keyword list was given for a category that has no keyword check.
    #[error("Unknown keyword category: {0}")]
    UnknownCategory(String),

    /// An allowed content type is not a valid MIME type.
    #[error("Invalid content type '{0}'")]
    InvalidContentType(String),
}

impl SecurityError {
    /// Create an invalid pattern error.
    pub fn invalid_pattern(name: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            name: name.into(),
            source,
        }
    }
}
