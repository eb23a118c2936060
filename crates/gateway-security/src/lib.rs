//! # Gateway Security
//!
//! Content guardrails for the LLM policy gateway.
//!
//! ## Features
//!
//! - **Structural checks**: content type allow-list, body size, token estimates
//! - **Classifiers**: PII patterns and keyword lists behind a pluggable trait
//! - **Secret scanning**: credential-shaped strings in completions (and
//!   optionally prompts), reported by pattern name only
//!
//! ## Example
//!
//! ```rust,no_run
//! use gateway_config::GuardrailConfig;
//! use gateway_security::ContentGuardrail;
//!
//! let guardrail = ContentGuardrail::from_config(&GuardrailConfig::default()).unwrap();
//! let verdict = guardrail.check_input("hello", Some("application/json"), 5);
//! assert!(verdict.is_pass());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classifier;
pub mod error;
pub mod guardrail;
pub mod patterns;
pub mod secret_scan;

pub use classifier::{
    BlockCategory, Classification, Classifier, KeywordClassifier, PatternClassifier,
};
pub use error::{Result, SecurityError};
pub use gateway_core::estimate_tokens;
pub use guardrail::{BlockReason, ContentGuardrail, Verdict};
pub use secret_scan::SecretScanner;
