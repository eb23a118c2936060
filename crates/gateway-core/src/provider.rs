//! Upstream provider abstraction.

use crate::error::GatewayResult;
use crate::request::GatewayRequest;
use crate::response::Completion;
use async_trait::async_trait;

/// An inference backend the gateway forwards admitted requests to.
///
/// Implementations must not retry internally; the gateway surfaces upstream
/// failures to the caller as-is.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Stable identifier used in logs
    fn id(&self) -> &str;

    /// Run a chat completion
    async fn complete(&self, request: &GatewayRequest) -> GatewayResult<Completion>;
}
