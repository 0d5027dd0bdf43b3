//! HTTP handlers.
//!
//! Implements:
//! - POST /beginTransaction, POST /endTransaction, GET /session
//! - GET /lastTouch
//! - PUT /folder (create), POST /folder (recursive listing)
//! - DELETE /file
//! - POST /file-upload (multipart), POST /file-download
//! - GET /health

use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hyper::ext::ReasonPhrase;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};
use tokio_util::io::ReaderStream;
use tracing::debug;
use treesync_core::{BatchOutcome, SyncError, TreeSnapshotEntry};

use crate::auth::Identity;
use crate::error::{ApiError, Result};
use crate::upload::{read_upload_form, truncate_touch_time, UPLOAD_USAGE};
use crate::AppState;

const NAMES_USAGE: &str = "Body must be of type : {names:[pathString]}";
const NAME_USAGE: &str = "Body must be of type : {name:pathString}";

/// Header duplicating the download's modification time (Unix millis).
pub const LAST_TOUCH_HEADER: &str = "x-last-touch";

#[derive(Debug, Deserialize)]
pub struct NamesRequest {
    pub names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub names: Vec<String>,
    #[serde(default)]
    pub last_touch: Option<Number>,
}

impl DeleteRequest {
    /// `lastTouch` in millis, truncated like the upload form field.
    fn touch_time(&self) -> Result<Option<i64>> {
        let Some(number) = &self.last_touch else {
            return Ok(None);
        };
        number
            .as_i64()
            .or_else(|| number.as_f64().and_then(truncate_touch_time))
            .map(Some)
            .ok_or_else(|| ApiError::MalformedRequest(format!("Invalid lastTouch: {}", number)))
    }
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastTouchResponse {
    pub last_touch: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub owned: bool,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

fn parse_body<T>(payload: std::result::Result<Json<T>, JsonRejection>, usage: &str) -> Result<T> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        debug!("Malformed body: {}", rejection);
        ApiError::MalformedRequest(usage.to_string())
    })
}

/// `{<key>: "k/N"}` plus the per-item errors; 500 when any item failed.
fn batch_response(key: &str, outcome: BatchOutcome) -> Response {
    let mut body = Map::new();
    body.insert(key.to_string(), Value::String(outcome.ratio()));

    if outcome.is_complete() {
        return (StatusCode::OK, Json(Value::Object(body))).into_response();
    }

    body.insert("errors".to_string(), json!(outcome.failures));
    (StatusCode::INTERNAL_SERVER_ERROR, Json(Value::Object(body))).into_response()
}

/// HTTP-date for the `Last-Modified` header.
fn http_date(millis: i64) -> Option<HeaderValue> {
    let date = chrono::DateTime::from_timestamp_millis(millis)?;
    HeaderValue::from_str(&date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()).ok()
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /beginTransaction
pub async fn begin_transaction(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<StatusCode> {
    state.gateway.begin_session(identity.as_str())?;
    Ok(StatusCode::OK)
}

/// POST /endTransaction
pub async fn end_transaction(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<StatusCode> {
    state.gateway.end_session(identity.as_str())?;
    Ok(StatusCode::OK)
}

/// GET /session
pub async fn session_status(
    State(state): State<AppState>,
    identity: Identity,
) -> Json<SessionResponse> {
    let view = state.gateway.session().view(identity.as_str());
    Json(SessionResponse {
        owned: view.owned,
        locked: view.locked,
        expires_at: view.expires_at,
    })
}

/// GET /lastTouch
pub async fn last_touch(
    State(state): State<AppState>,
    _identity: Identity,
) -> Json<LastTouchResponse> {
    Json(LastTouchResponse {
        last_touch: state.gateway.last_touch(),
    })
}

/// PUT /folder
pub async fn create_folders(
    State(state): State<AppState>,
    identity: Identity,
    payload: std::result::Result<Json<NamesRequest>, JsonRejection>,
) -> Result<Response> {
    let request = parse_body(payload, NAMES_USAGE)?;
    let outcome = state
        .gateway
        .create_folders(identity.as_str(), &request.names)
        .await?;
    Ok(batch_response("createdFolders", outcome))
}

/// DELETE /file
pub async fn delete_files(
    State(state): State<AppState>,
    identity: Identity,
    payload: std::result::Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Response> {
    let request = parse_body(payload, NAMES_USAGE)?;
    let touch_time = request.touch_time()?;
    let outcome = state
        .gateway
        .delete_entries(identity.as_str(), &request.names, touch_time)
        .await?;
    Ok(batch_response("deleted", outcome))
}

/// POST /folder
pub async fn list_folder(
    State(state): State<AppState>,
    identity: Identity,
    payload: std::result::Result<Json<NameRequest>, JsonRejection>,
) -> Result<Json<Vec<TreeSnapshotEntry>>> {
    let request = parse_body(payload, NAME_USAGE)?;
    let entries = state
        .gateway
        .list_tree(identity.as_str(), &request.name)
        .await
        .map_err(|err| match err {
            SyncError::Conflict | SyncError::RejectedPath(_) => ApiError::from(err),
            other => ApiError::ScanFailed(other.to_string()),
        })?;
    Ok(Json(entries))
}

/// POST /file-upload
pub async fn upload_files(
    State(state): State<AppState>,
    identity: Identity,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let mut multipart = multipart.map_err(|rejection| {
        debug!("Malformed upload: {}", rejection);
        ApiError::MalformedRequest(UPLOAD_USAGE.to_string())
    })?;

    // Refuse before anything is spooled to the staging disk.
    state.gateway.session().check_ownership(identity.as_str())?;

    // Staged files are cleaned up when `form` drops, whatever the outcome.
    let form = read_upload_form(&mut multipart, &state.staging_dir).await?;
    let location = match form.location.as_deref() {
        Some(location) if !form.files.is_empty() => location,
        _ => return Err(ApiError::MalformedRequest(UPLOAD_USAGE.to_string())),
    };

    let files: Vec<_> = form.files.iter().map(|f| f.as_uploaded()).collect();
    let outcome = state
        .gateway
        .upload_files(identity.as_str(), location, &files, form.last_touch)
        .await?;
    Ok(batch_response("insertedFiles", outcome))
}

/// POST /file-download
///
/// Streams the file. Its modification time travels as the HTTP/1 reason
/// phrase, the `x-last-touch` header and `Last-Modified`.
pub async fn download_file(
    State(state): State<AppState>,
    identity: Identity,
    payload: std::result::Result<Json<NameRequest>, JsonRejection>,
) -> Result<Response> {
    let request = parse_body(payload, NAME_USAGE)?;
    let download = state
        .gateway
        .download_file(identity.as_str(), &request.name)
        .await?;

    let last_modified = download.last_modified.to_string();
    let mut response = Body::from_stream(ReaderStream::new(download.reader)).into_response();

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(LAST_TOUCH_HEADER, value);
    }
    if let Some(value) = http_date(download.last_modified) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    if let Ok(reason) = ReasonPhrase::try_from(last_modified) {
        response.extensions_mut().insert(reason);
    }

    Ok(response)
}
