//! Bearer-key authentication and principal resolution.
//!
//! The gateway has one static master key. Presented keys are hashed with
//! SHA-256 and compared digest to digest, so the comparison cost does not
//! depend on where the first differing byte is.
//!
//! By default the caller names the principal through `x-user-id` or the body
//! `user` field. Any holder of the master key can therefore pick a fresh
//! principal per request and get fresh per-principal rate limits and
//! budgets; the global ceilings still apply. Set
//! `auth.pin_principal_to_key` to attribute every request to the key id
//! instead.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use gateway_config::AuthConfig;
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Principal used when authentication is disabled
pub const ANONYMOUS_PRINCIPAL: &str = "anonymous";

/// Header naming the end user on whose behalf a request is made
pub const USER_HEADER: &str = "x-user-id";

/// Authentication failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No bearer credential on the request
    #[error("Missing bearer credential")]
    MissingCredentials,
    /// Credential does not match the master key
    #[error("Invalid API key")]
    InvalidApiKey,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::unauthorized(err.to_string())
    }
}

/// Identity attached to an authenticated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedKey {
    /// Stable id derived from the key digest, or `anonymous`
    pub key_id: String,
}

/// Validates bearer credentials against the configured master key
#[derive(Clone)]
pub struct Authenticator {
    master_digest: Option<[u8; 32]>,
    pin_principal: bool,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("enabled", &self.is_enabled())
            .field("pin_principal", &self.pin_principal)
            .finish()
    }
}

impl Authenticator {
    /// Build from configuration; no master key disables authentication
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            master_digest: config
                .master_key
                .as_ref()
                .map(|key| digest(key.expose_secret())),
            pin_principal: config.pin_principal_to_key,
        }
    }

    /// Authenticator that accepts every request
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            master_digest: None,
            pin_principal: false,
        }
    }

    /// Whether a credential is required
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.master_digest.is_some()
    }

    /// Check the `Authorization` header
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedKey, AuthError> {
        let Some(expected) = &self.master_digest else {
            return Ok(AuthenticatedKey {
                key_id: ANONYMOUS_PRINCIPAL.to_string(),
            });
        };

        let key = bearer_token(headers).ok_or(AuthError::MissingCredentials)?;
        let presented = digest(key);
        if !digests_match(&presented, expected) {
            return Err(AuthError::InvalidApiKey);
        }

        Ok(AuthenticatedKey {
            key_id: format!("key-{}", &hex::encode(presented)[..12]),
        })
    }

    /// Principal for an authenticated request, honouring
    /// `pin_principal_to_key`
    #[must_use]
    pub fn principal_for(&self, headers: &HeaderMap, body_user: Option<&str>, key: &AuthenticatedKey) -> String {
        if self.pin_principal {
            key.key_id.clone()
        } else {
            resolve_principal(headers, body_user, key)
        }
    }
}

/// Principal id for a request: `x-user-id`, then the body `user`, then the key
#[must_use]
pub fn resolve_principal(headers: &HeaderMap, body_user: Option<&str>, key: &AuthenticatedKey) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| body_user.map(str::trim).filter(|u| !u.is_empty()))
        .map_or_else(|| key.key_id.clone(), ToString::to_string)
}

/// Rejects unauthenticated requests and stores [`AuthenticatedKey`] in
/// request extensions
pub async fn auth_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    match state.authenticator().authenticate(request.headers()) {
        Ok(key) => {
            debug!(key_id = %key.key_id, "Request authenticated");
            request.extensions_mut().insert(key);
            next.run(request).await
        }
        Err(err) => {
            warn!(error = %err, path = %request.uri().path(), "Authentication failed");
            ApiError::from(err).into_response()
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

fn digest(key: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(key.as_bytes()));
    out
}

fn digests_match(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
