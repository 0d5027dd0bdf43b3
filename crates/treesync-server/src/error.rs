//! Error types for the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use treesync_core::SyncError;

use crate::fault::Fault;

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Session is held by another device")]
    Conflict,

    #[error("{0}")]
    MalformedRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ScanFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Conflict => ApiError::Conflict,
            SyncError::RejectedPath(e) => {
                ApiError::MalformedRequest(format!("One or many names aren't correct: {}", e))
            }
            SyncError::NotFound(path) => ApiError::NotFound(format!("{}: not found", path)),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody {
            error: String,
            code: &'static str,
        }

        let json = |status: StatusCode, code: &'static str, error: String| {
            (status, axum::Json(ErrorBody { error, code })).into_response()
        };

        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            ApiError::Conflict => json(
                StatusCode::CONFLICT,
                "CONFLICT",
                "Session is held by another device".to_string(),
            ),
            ApiError::MalformedRequest(message) => {
                (StatusCode::BAD_REQUEST, message).into_response()
            }
            ApiError::NotFound(message) => json(StatusCode::NOT_FOUND, "NOT_FOUND", message),
            ApiError::ScanFailed(message) => {
                json(StatusCode::INTERNAL_SERVER_ERROR, "SCAN_FAILED", message)
            }
            ApiError::Internal(message) => {
                // Body stays empty; the fault layer writes the details down.
                let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
                response.extensions_mut().insert(Fault(message));
                response
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
