use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, instrument, warn};
use treesync_core::{
    DirEntryInfo, EntryKind, FileOperations, FileReader, SafePath, SyncError,
};

/// Filesystem operations rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalFileOperations {
    root: PathBuf,
}

impl LocalFileOperations {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &SafePath) -> PathBuf {
        path.resolve(&self.root)
    }
}

fn to_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_millis()).unwrap_or(i64::MAX),
    }
}

fn to_system_time(millis: i64) -> SystemTime {
    let offset = Duration::from_millis(millis.unsigned_abs());
    if millis >= 0 {
        UNIX_EPOCH + offset
    } else {
        UNIX_EPOCH - offset
    }
}

#[async_trait]
impl FileOperations for LocalFileOperations {
    #[instrument(skip(self), level = "debug", fields(path = %path))]
    async fn create_dir(&self, path: &SafePath) -> Result<(), SyncError> {
        fs::create_dir(self.resolve(path))
            .await
            .map_err(|e| SyncError::from_io("mkdir", path, e))
    }

    #[instrument(skip(self), level = "debug", fields(path = %path))]
    async fn create_dir_all(&self, path: &SafePath) -> Result<(), SyncError> {
        fs::create_dir_all(self.resolve(path))
            .await
            .map_err(|e| SyncError::from_io("mkdir", path, e))
    }

    #[instrument(skip(self), level = "debug", fields(path = %path))]
    async fn remove_recursive(&self, path: &SafePath) -> Result<(), SyncError> {
        let target = self.resolve(path);
        // Do not follow symlinks: remove the link, never its target.
        let metadata = fs::symlink_metadata(&target)
            .await
            .map_err(|e| SyncError::from_io("stat", path, e))?;

        let result = if metadata.is_dir() {
            fs::remove_dir_all(&target).await
        } else {
            fs::remove_file(&target).await
        };
        result.map_err(|e| SyncError::from_io("remove", path, e))
    }

    #[instrument(skip(self), level = "debug", fields(path = %path))]
    async fn remove_empty_dir(&self, path: &SafePath) -> Result<(), SyncError> {
        fs::remove_dir(self.resolve(path))
            .await
            .map_err(|e| SyncError::from_io("rmdir", path, e))
    }

    #[instrument(skip(self), level = "debug", fields(dest = %dest))]
    async fn move_into(&self, source: &Path, dest: &SafePath) -> Result<(), SyncError> {
        let target = self.resolve(dest);
        if let Err(rename_err) = fs::rename(source, &target).await {
            // The staging area may live on another filesystem.
            debug!(
                "Rename from {} failed ({}), falling back to copy",
                source.display(),
                rename_err
            );
            fs::copy(source, &target)
                .await
                .map_err(|e| SyncError::from_io("move", dest, e))?;
            if let Err(e) = fs::remove_file(source).await {
                warn!("Failed to remove staged file {}: {}", source.display(), e);
            }
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(path = %path))]
    async fn read_dir(&self, path: &SafePath) -> Result<Vec<DirEntryInfo>, SyncError> {
        let dir = self.resolve(path);
        let mut read_dir = fs::read_dir(&dir)
            .await
            .map_err(|e| SyncError::from_io("readdir", path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| SyncError::from_io("readdir", path, e))?
        {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    // Reported as `Other`: the directory is not empty.
                    warn!("Non UTF-8 entry {:?} in {}", raw, path);
                    entries.push(DirEntryInfo::new(
                        raw.to_string_lossy(),
                        EntryKind::Other,
                    ));
                    continue;
                }
            };

            let file_type = entry
                .file_type()
                .await
                .map_err(|e| SyncError::from_io("stat", path.child(&name), e))?;

            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else if file_type.is_symlink() {
                // Links to files are reported; links to directories are not
                // followed so a cycle can never trap the scanner.
                match fs::metadata(entry.path()).await {
                    Ok(target) if target.is_file() => EntryKind::File,
                    _ => EntryKind::Other,
                }
            } else {
                EntryKind::Other
            };

            entries.push(DirEntryInfo::new(name, kind));
        }

        Ok(entries)
    }

    async fn modified_millis(&self, path: &SafePath) -> Result<i64, SyncError> {
        let metadata = fs::metadata(self.resolve(path))
            .await
            .map_err(|e| SyncError::from_io("stat", path, e))?;
        let modified = metadata
            .modified()
            .map_err(|e| SyncError::from_io("stat", path, e))?;
        Ok(to_millis(modified))
    }

    #[instrument(skip(self), level = "debug", fields(path = %path))]
    async fn set_modified_millis(&self, path: &SafePath, millis: i64) -> Result<(), SyncError> {
        let target = self.resolve(path);
        let mtime = to_system_time(millis);

        tokio::task::spawn_blocking(move || {
            std::fs::File::options()
                .write(true)
                .open(&target)?
                .set_modified(mtime)
        })
        .await
        .map_err(|e| SyncError::from_io("touch", path, io::Error::other(e.to_string())))?
        .map_err(|e| SyncError::from_io("touch", path, e))
    }

    async fn open_read(&self, path: &SafePath) -> Result<FileReader, SyncError> {
        let target = self.resolve(path);
        let metadata = fs::metadata(&target)
            .await
            .map_err(|e| SyncError::from_io("stat", path, e))?;
        if !metadata.is_file() {
            return Err(SyncError::from_io(
                "open",
                path,
                io::Error::other("not a regular file"),
            ));
        }

        let file = fs::File::open(&target)
            .await
            .map_err(|e| SyncError::from_io("open", path, e))?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use treesync_core::{
        ManualClock, SessionLock, SyncGateway, SyncWatermark, TreeScanner, TreeSnapshotEntry,
        UploadedFile,
    };

    use super::*;

    fn setup() -> (LocalFileOperations, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let ops = LocalFileOperations::new(temp_dir.path());
        (ops, temp_dir)
    }

    fn path(raw: &str) -> SafePath {
        SafePath::parse(raw).unwrap()
    }

    #[test]
    fn test_millis_conversions() {
        assert_eq!(to_millis(UNIX_EPOCH + Duration::from_millis(1_500)), 1_500);
        assert_eq!(to_millis(UNIX_EPOCH - Duration::from_millis(250)), -250);

        assert_eq!(
            to_system_time(1_234),
            UNIX_EPOCH + Duration::from_millis(1_234)
        );
        assert_eq!(to_millis(to_system_time(-250)), -250);
    }

    #[tokio::test]
    async fn test_create_and_remove_directories() {
        let (ops, temp_dir) = setup();

        ops.create_dir(&path("notes")).await.unwrap();
        assert!(temp_dir.path().join("notes").is_dir());

        let err = ops.create_dir(&path("notes")).await.unwrap_err();
        assert!(err.to_string().contains("notes"));

        let err = ops.create_dir(&path("missing/child")).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));

        ops.create_dir_all(&path("a/b/c")).await.unwrap();
        tokio::fs::write(temp_dir.path().join("a/b/c/f.txt"), b"x")
            .await
            .unwrap();

        assert!(ops.remove_empty_dir(&path("a/b")).await.is_err());
        ops.remove_recursive(&path("a")).await.unwrap();
        assert!(!temp_dir.path().join("a").exists());

        let err = ops.remove_recursive(&path("a")).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_names_with_spaces_are_literal() {
        let (ops, temp_dir) = setup();
        ops.create_dir(&path("My Documents")).await.unwrap();
        assert!(temp_dir.path().join("My Documents").is_dir());

        let entries = ops.read_dir(&SafePath::root()).await.unwrap();
        assert_eq!(
            entries,
            vec![DirEntryInfo::new("My Documents", EntryKind::Directory)]
        );
    }

    #[tokio::test]
    async fn test_set_modified_round_trips_through_scan() {
        let (ops, temp_dir) = setup();
        std::fs::create_dir_all(temp_dir.path().join("notes")).unwrap();
        std::fs::write(temp_dir.path().join("notes/a.txt"), b"hello").unwrap();
        std::fs::write(temp_dir.path().join("top.txt"), b"top").unwrap();

        ops.set_modified_millis(&path("notes/a.txt"), 1_000)
            .await
            .unwrap();
        ops.set_modified_millis(&path("top.txt"), 1_700_000_000_123)
            .await
            .unwrap();

        let scanned: BTreeSet<_> = TreeScanner::new(&ops)
            .scan(&SafePath::root())
            .await
            .unwrap()
            .into_iter()
            .collect();

        let expected: BTreeSet<_> = [
            TreeSnapshotEntry {
                relative_path: "notes/a.txt".to_string(),
                last_modified: 1_000,
            },
            TreeSnapshotEntry {
                relative_path: "top.txt".to_string(),
                last_modified: 1_700_000_000_123,
            },
        ]
        .into_iter()
        .collect();
        assert_eq!(scanned, expected);
    }

    #[tokio::test]
    async fn test_move_into_replaces_existing_file() {
        let (ops, temp_dir) = setup();
        let staging = TempDir::new().unwrap();
        let staged = staging.path().join("upload-1");
        std::fs::write(&staged, b"new").unwrap();
        std::fs::write(temp_dir.path().join("doc.txt"), b"old").unwrap();

        ops.move_into(&staged, &path("doc.txt")).await.unwrap();

        assert!(!staged.exists());
        assert_eq!(std::fs::read(temp_dir.path().join("doc.txt")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_open_read_streams_contents() {
        let (ops, temp_dir) = setup();
        std::fs::write(temp_dir.path().join("data.bin"), b"\x00\x01\x02").unwrap();

        let mut reader = ops.open_read(&path("data.bin")).await.unwrap();
        let mut contents = Vec::new();
        reader.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"\x00\x01\x02");

        std::fs::create_dir(temp_dir.path().join("dir")).unwrap();
        assert!(ops.open_read(&path("dir")).await.is_err());
        assert!(matches!(
            ops.open_read(&path("nope")).await.err().unwrap(),
            SyncError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_scan_missing_root_fails() {
        let (ops, _temp_dir) = setup();
        let err = TreeScanner::new(&ops)
            .scan(&path("does/not/exist"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_directory_symlinks_are_not_followed() {
        let (ops, temp_dir) = setup();
        std::fs::create_dir(temp_dir.path().join("real")).unwrap();
        std::fs::write(temp_dir.path().join("real/f.txt"), b"f").unwrap();
        std::os::unix::fs::symlink(temp_dir.path(), temp_dir.path().join("real/loop")).unwrap();

        let scanned = TreeScanner::new(&ops).scan(&SafePath::root()).await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].relative_path, "real/f.txt");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_non_utf8_entries_keep_directory_from_sweep() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (ops, temp_dir) = setup();
        std::fs::create_dir_all(temp_dir.path().join("zz/bad")).unwrap();
        std::fs::write(
            temp_dir.path().join("zz/bad").join(OsStr::from_bytes(b"\xff")),
            b"x",
        )
        .unwrap();
        std::fs::create_dir(temp_dir.path().join("aa")).unwrap();
        std::fs::create_dir(temp_dir.path().join("mm")).unwrap();
        std::fs::write(temp_dir.path().join("gone.txt"), b"g").unwrap();

        let entries = ops.read_dir(&path("zz/bad")).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::Other);

        let clock = Arc::new(ManualClock::new(0));
        let gateway = SyncGateway::new(
            Arc::new(ops),
            Arc::new(SessionLock::new(clock.clone(), Duration::from_secs(1800))),
            Arc::new(SyncWatermark::starting_now(clock.as_ref())),
            clock,
        );
        let outcome = gateway
            .delete_entries("dev1", &["gone.txt".to_string()], None)
            .await
            .unwrap();

        assert_eq!(outcome.ratio(), "1/1");
        assert!(!temp_dir.path().join("aa").exists());
        assert!(!temp_dir.path().join("mm").exists());
        assert!(temp_dir.path().join("zz/bad").is_dir());
    }

    #[tokio::test]
    async fn test_gateway_scenario_on_disk() {
        let (ops, temp_dir) = setup();
        let staging = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let gateway = SyncGateway::new(
            Arc::new(ops),
            Arc::new(SessionLock::new(clock.clone(), Duration::from_secs(1800))),
            Arc::new(SyncWatermark::starting_now(clock.as_ref())),
            clock,
        );

        gateway.begin_session("dev1").unwrap();
        gateway
            .create_folders("dev1", &["notes".to_string()])
            .await
            .unwrap();

        let staged = staging.path().join("upload-a");
        std::fs::write(&staged, b"hello").unwrap();
        let outcome = gateway
            .upload_files(
                "dev1",
                "notes",
                &[UploadedFile {
                    file_name: "a.txt".to_string(),
                    staged_path: staged,
                }],
                Some(1_000),
            )
            .await
            .unwrap();
        assert_eq!(outcome.ratio(), "1/1");

        let listing = gateway.list_tree("dev1", "").await.unwrap();
        assert_eq!(
            listing,
            vec![TreeSnapshotEntry {
                relative_path: "notes/a.txt".to_string(),
                last_modified: 1_000,
            }]
        );
        assert_eq!(gateway.last_touch(), 1_000);

        let outcome = gateway
            .delete_entries(
                "dev1",
                &["notes/a.txt".to_string(), "missing.txt".to_string()],
                Some(2_000),
            )
            .await
            .unwrap();
        assert_eq!(outcome.ratio(), "1/2");
        // The emptied folder is swept away.
        assert!(!temp_dir.path().join("notes").exists());
        assert!(temp_dir.path().exists());
        assert_eq!(gateway.last_touch(), 2_000);
    }
}
