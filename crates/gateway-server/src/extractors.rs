//! Custom Axum extractors for the gateway.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::{header, request::Parts},
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ApiError;

/// Extract request ID from headers or generate one
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-request-id")
            .or_else(|| parts.headers.get("x-correlation-id"))
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

        Ok(Self(id))
    }
}

/// JSON body that keeps the transport facts the input guardrail inspects.
///
/// The content type is not enforced here; an unexpected type is reported by
/// the guardrail as a policy violation.
#[derive(Debug)]
pub struct GuardedJson<T> {
    /// Parsed body
    pub value: T,
    /// `Content-Type` header, if any
    pub content_type: Option<String>,
    /// Raw body size in bytes
    pub size: usize,
}

#[async_trait]
impl<S, T> FromRequest<S> for GuardedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            ApiError::new(
                e.status(),
                "invalid_request_error",
                format!("Failed to read request body: {e}"),
            )
        })?;

        let value: T = serde_json::from_slice(&bytes).map_err(|e| {
            debug!(error = %e, "JSON parse error");
            ApiError::bad_request(format!("Invalid JSON: {e}"))
        })?;

        Ok(Self {
            value,
            content_type,
            size: bytes.len(),
        })
    }
}
