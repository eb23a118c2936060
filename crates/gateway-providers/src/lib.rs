//! # Gateway Providers
//!
//! Upstream inference clients for the LLM policy gateway.
//!
//! The pipeline only sees [`gateway_core::InferenceProvider`]; this crate
//! supplies the OpenAI-compatible HTTP implementation used in production.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod openai;

// Re-export main types
pub use openai::{OpenAiCompatibleProvider, OpenAiConfig};
