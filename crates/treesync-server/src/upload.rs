//! Multipart upload spooling.
//!
//! File parts are written to the staging directory as they arrive. Each
//! spooled file is deleted when its `StagedFile` is dropped unless the
//! gateway has already moved it into the tree, so a rejected request never
//! leaves stray files behind.

use std::path::Path;

use axum::extract::multipart::{Field, Multipart};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use treesync_core::UploadedFile;

use crate::error::ApiError;

const LOCATION_FIELD: &str = "location";
const LAST_TOUCH_FIELD: &str = "lastTouch";

pub const UPLOAD_USAGE: &str =
    "Body must be of type : {location:pathString} and must have files";

pub struct StagedFile {
    pub file_name: String,
    path: TempPath,
}

impl StagedFile {
    pub fn as_uploaded(&self) -> UploadedFile {
        UploadedFile {
            file_name: self.file_name.clone(),
            staged_path: self.path.to_path_buf(),
        }
    }
}

#[derive(Default)]
pub struct UploadForm {
    pub location: Option<String>,
    pub last_touch: Option<i64>,
    pub files: Vec<StagedFile>,
}

fn malformed(err: impl std::fmt::Display) -> ApiError {
    ApiError::MalformedRequest(format!("Invalid multipart body: {}", err))
}

fn staging_failure(err: impl std::fmt::Display) -> ApiError {
    ApiError::Internal(format!("Failed to spool upload: {}", err))
}

/// Fractional millis are truncated toward zero; non-finite values are refused.
pub fn truncate_touch_time(value: f64) -> Option<i64> {
    value.is_finite().then(|| value as i64)
}

/// Accepts integer millis, or a JS-style float which is truncated.
fn parse_touch_time(raw: &str) -> Result<i64, ApiError> {
    let raw = raw.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().and_then(truncate_touch_time))
        .ok_or_else(|| ApiError::MalformedRequest(format!("Invalid lastTouch: {:?}", raw)))
}

async fn spool_field(mut field: Field<'_>, staging_dir: &Path) -> Result<TempPath, ApiError> {
    let (file, path) = tempfile::Builder::new()
        .prefix("upload-")
        .tempfile_in(staging_dir)
        .map_err(staging_failure)?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    while let Some(chunk) = field.chunk().await.map_err(malformed)? {
        file.write_all(&chunk).await.map_err(staging_failure)?;
    }
    file.flush().await.map_err(staging_failure)?;
    Ok(path)
}

/// Read the whole form, spooling every file part to `staging_dir`.
pub async fn read_upload_form(
    multipart: &mut Multipart,
    staging_dir: &Path,
) -> Result<UploadForm, ApiError> {
    tokio::fs::create_dir_all(staging_dir)
        .await
        .map_err(staging_failure)?;

    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if let Some(file_name) = field.file_name().map(str::to_string) {
            let path = spool_field(field, staging_dir).await?;
            debug!("Spooled {} to {}", file_name, path.display());
            form.files.push(StagedFile { file_name, path });
            continue;
        }

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(LOCATION_FIELD) => form.location = Some(field.text().await.map_err(malformed)?),
            Some(LAST_TOUCH_FIELD) => {
                let raw = field.text().await.map_err(malformed)?;
                form.last_touch = Some(parse_touch_time(&raw)?);
            }
            _ => {}
        }
    }

    Ok(form)
}
