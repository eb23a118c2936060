//! # Gateway Resilience
//!
//! Admission control for the LLM policy gateway:
//! - Fixed-window request ceilings (global, per principal, per model)
//! - Per-principal concurrency gauge with scoped release

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod concurrency;
pub mod rate_limiter;

// Re-export main types
pub use concurrency::{ConcurrencyLimiter, ConcurrencyPermit};
pub use rate_limiter::{AdmissionPermit, RateDecision, RateLimiter, CONCURRENCY_RETRY_AFTER_SECS};
