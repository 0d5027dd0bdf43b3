//! Bearer-token access check.
//!
//! The token that passes the allow-list is also the device identity used
//! by the session lock.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::AppState;

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct Identity(pub String);

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Extract Bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_bearer_token(&parts.headers) else {
            debug!("Request without bearer token on {}", parts.uri.path());
            return Err(ApiError::Unauthorized);
        };

        if !state.access.has_access(token) {
            warn!("Rejected unknown token on {}", parts.uri.path());
            return Err(ApiError::Unauthorized);
        }

        Ok(Identity(token.to_string()))
    }
}
