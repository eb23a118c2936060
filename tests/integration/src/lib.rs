//! Integration tests for the LLM policy gateway
//!
//! Each test starts the real server on an ephemeral port in front of a
//! wiremock upstream and drives it over HTTP:
//! - End-to-end request flow, auth and shutdown
//! - Rate limiting
//! - Content guardrails
//! - Budget alerts and enforcement

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items
pub use fixtures::*;
pub use helpers::*;

#[cfg(test)]
mod budget_tests;
#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
mod guardrail_tests;
#[cfg(test)]
mod rate_limit_tests;
