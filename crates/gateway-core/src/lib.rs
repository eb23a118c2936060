//! # Gateway Core
//!
//! Core types, traits, and error handling for the LLM policy gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - Request and response types
//! - The upstream provider trait
//! - The error taxonomy every policy stage reports through
//! - Caller identity
//! - Clock and time-window arithmetic

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod principal;
pub mod provider;
pub mod request;
pub mod response;
pub mod time;
pub mod tokens;

// Re-export commonly used types
pub use error::{GatewayError, GatewayResult, GuardrailStage, Scope};
pub use principal::{Principal, PrincipalLimits};
pub use provider::InferenceProvider;
pub use request::{ChatMessage, ContentPart, GatewayRequest, MessageContent, MessageRole};
pub use response::{ChatCompletionResponse, Choice, Completion, Usage};
pub use time::{BudgetPeriod, Clock, ManualClock, SystemClock, WindowKind};
pub use tokens::estimate_tokens;
