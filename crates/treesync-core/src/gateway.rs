//! Orchestration of sync operations.
//!
//! Every operation first checks the caller against the session lock, then
//! validates all paths of the request before touching the filesystem, then
//! works through the items one at a time in submission order. A failing
//! item is recorded and the batch moves on.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::clock::SharedClock;
use crate::error::SyncError;
use crate::fs::{EntryKind, FileOperations, FileReader};
use crate::path::SafePath;
use crate::scan::{TreeScanner, TreeSnapshotEntry};
use crate::session::SessionLock;
use crate::watermark::SyncWatermark;

/// Result of a multi-item operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub total: usize,
    pub failures: Vec<String>,
}

impl BatchOutcome {
    fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    fn record(&mut self, item: &SafePath, result: Result<(), SyncError>) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(e) => {
                warn!("Batch item {} failed: {}", item, e);
                self.failures.push(e.to_string());
            }
        }
    }

    /// `"<succeeded>/<total>"`, as reported to clients.
    pub fn ratio(&self) -> String {
        format!("{}/{}", self.succeeded, self.total)
    }

    pub fn is_complete(&self) -> bool {
        self.succeeded == self.total
    }
}

/// An upload spooled to a staging file, waiting to be moved into the tree.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied name, relative to the upload location.
    pub file_name: String,
    pub staged_path: PathBuf,
}

/// An opened file ready to be streamed to a client.
pub struct FileDownload {
    pub reader: FileReader,
    pub last_modified: i64,
}

/// Shared entry point for every sync operation.
#[derive(Clone)]
pub struct SyncGateway {
    fs: Arc<dyn FileOperations>,
    session: Arc<SessionLock>,
    watermark: Arc<SyncWatermark>,
    clock: SharedClock,
}

fn sanitize_all<'a>(
    names: impl IntoIterator<Item = &'a String>,
) -> Result<Vec<SafePath>, SyncError> {
    names
        .into_iter()
        .map(|name| -> Result<SafePath, SyncError> {
            Ok(SafePath::parse(name)?.require_entry()?)
        })
        .collect()
}

impl SyncGateway {
    pub fn new(
        fs: Arc<dyn FileOperations>,
        session: Arc<SessionLock>,
        watermark: Arc<SyncWatermark>,
        clock: SharedClock,
    ) -> Self {
        Self {
            fs,
            session,
            watermark,
            clock,
        }
    }

    pub fn session(&self) -> &SessionLock {
        &self.session
    }

    pub fn begin_session(&self, identity: &str) -> Result<(), SyncError> {
        self.session.begin_session(identity)
    }

    pub fn end_session(&self, identity: &str) -> Result<(), SyncError> {
        self.session.end_session(identity)
    }

    /// Current watermark (Unix millis).
    pub fn last_touch(&self) -> i64 {
        self.watermark.read()
    }

    #[instrument(skip(self, identity, names), fields(count = names.len()))]
    pub async fn create_folders(
        &self,
        identity: &str,
        names: &[String],
    ) -> Result<BatchOutcome, SyncError> {
        self.session.check_ownership(identity)?;
        let paths = sanitize_all(names)?;

        let mut outcome = BatchOutcome::new(paths.len());
        for path in &paths {
            outcome.record(path, self.fs.create_dir(path).await);
        }

        info!("Created {} folders", outcome.ratio());
        Ok(outcome)
    }

    /// Remove files or directory trees, then prune directories left empty.
    ///
    /// The watermark moves to `new_watermark` (or now) once at least one item
    /// was removed.
    #[instrument(skip(self, identity, names), fields(count = names.len()))]
    pub async fn delete_entries(
        &self,
        identity: &str,
        names: &[String],
        new_watermark: Option<i64>,
    ) -> Result<BatchOutcome, SyncError> {
        self.session.check_ownership(identity)?;
        let paths = sanitize_all(names)?;

        let mut outcome = BatchOutcome::new(paths.len());
        for path in &paths {
            outcome.record(path, self.fs.remove_recursive(path).await);
        }

        if outcome.succeeded > 0 {
            let touched = new_watermark.unwrap_or_else(|| self.clock.now_millis());
            self.watermark.advance(touched);
        }

        self.sweep_empty_dirs().await;

        info!("Deleted {} entries", outcome.ratio());
        Ok(outcome)
    }

    #[instrument(skip(self, identity))]
    pub async fn list_tree(
        &self,
        identity: &str,
        sub_path: &str,
    ) -> Result<Vec<TreeSnapshotEntry>, SyncError> {
        self.session.check_ownership(identity)?;
        let start = SafePath::parse(sub_path)?;
        TreeScanner::new(self.fs.as_ref()).scan(&start).await
    }

    /// Move staged uploads below `location`, stamping each with `touch_time`
    /// (or now) as its modification time.
    #[instrument(skip(self, identity, files), fields(count = files.len()))]
    pub async fn upload_files(
        &self,
        identity: &str,
        location: &str,
        files: &[UploadedFile],
        touch_time: Option<i64>,
    ) -> Result<BatchOutcome, SyncError> {
        self.session.check_ownership(identity)?;
        let location = SafePath::parse(location)?;
        let destinations = files
            .iter()
            .map(|file| -> Result<SafePath, SyncError> {
                Ok(location.join(&file.file_name)?.require_entry()?)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let touched = touch_time.unwrap_or_else(|| self.clock.now_millis());

        let mut outcome = BatchOutcome::new(files.len());
        for (file, dest) in files.iter().zip(&destinations) {
            let result = self.place_upload(file, dest, touched).await;
            outcome.record(dest, result);
        }

        if outcome.succeeded > 0 {
            self.watermark.advance(touched);
        }

        info!("Inserted {} files below {}", outcome.ratio(), location);
        Ok(outcome)
    }

    async fn place_upload(
        &self,
        file: &UploadedFile,
        dest: &SafePath,
        touched: i64,
    ) -> Result<(), SyncError> {
        if let Some(parent) = dest.parent() {
            self.fs.create_dir_all(&parent).await?;
        }
        self.fs.move_into(&file.staged_path, dest).await?;
        self.fs.set_modified_millis(dest, touched).await
    }

    #[instrument(skip(self, identity))]
    pub async fn download_file(
        &self,
        identity: &str,
        name: &str,
    ) -> Result<FileDownload, SyncError> {
        self.session.check_ownership(identity)?;
        let path = SafePath::parse(name)?.require_entry()?;

        let last_modified = self.fs.modified_millis(&path).await?;
        let reader = self.fs.open_read(&path).await?;
        debug!("Serving {} (modified {})", path, last_modified);

        Ok(FileDownload {
            reader,
            last_modified,
        })
    }

    /// Remove every empty directory below the root, deepest first, so that
    /// parents emptied by the removal of their children go too.
    ///
    /// A directory that cannot be listed or removed is logged and skipped;
    /// the rest of the tree is still swept.
    async fn sweep_empty_dirs(&self) -> usize {
        let mut dirs = Vec::new();
        let mut pending = vec![SafePath::root()];
        while let Some(dir) = pending.pop() {
            let children = match self.fs.read_dir(&dir).await {
                Ok(children) => children,
                Err(e) => {
                    warn!("Sweep skipped {}: {}", dir, e);
                    continue;
                }
            };
            for child in children {
                if child.kind == EntryKind::Directory {
                    let path = dir.child(&child.name);
                    pending.push(path.clone());
                    dirs.push(path);
                }
            }
        }

        // A parent is always discovered before its children.
        let mut removed = 0;
        for dir in dirs.iter().rev() {
            match self.fs.read_dir(dir).await {
                Ok(children) if children.is_empty() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!("Sweep skipped {}: {}", dir, e);
                    continue;
                }
            }
            match self.fs.remove_empty_dir(dir).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Sweep could not remove {}: {}", dir, e),
            }
        }

        if removed > 0 {
            debug!("Swept {} empty directories", removed);
        }
        removed
    }
}
