use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::SyncError;
use crate::fs::{EntryKind, FileOperations};
use crate::path::SafePath;

/// One file of a tree snapshot: root-relative path and modification time.
///
/// Directories are never reported. Callers compare snapshots as sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeSnapshotEntry {
    #[serde(rename = "fileName")]
    pub relative_path: String,
    /// Modification time (Unix millis); access time is not considered.
    #[serde(rename = "lastDate")]
    pub last_modified: i64,
}

/// Depth-first enumeration of every file below a directory.
pub struct TreeScanner<'a> {
    fs: &'a dyn FileOperations,
}

impl<'a> TreeScanner<'a> {
    pub fn new(fs: &'a dyn FileOperations) -> Self {
        Self { fs }
    }

    /// Snapshot every file below `start`. Only metadata is read.
    ///
    /// Any failure aborts the whole scan; a partial tree is never returned.
    #[instrument(skip(self), level = "debug", fields(start = %start))]
    pub async fn scan(&self, start: &SafePath) -> Result<Vec<TreeSnapshotEntry>, SyncError> {
        let mut entries = Vec::new();
        let mut pending = vec![start.clone()];

        while let Some(dir) = pending.pop() {
            let mut children = self.fs.read_dir(&dir).await?;
            children.sort_by(|a, b| a.name.cmp(&b.name));

            // Reverse so subdirectories are popped in name order.
            for child in children.into_iter().rev() {
                let path = dir.child(&child.name);
                match child.kind {
                    EntryKind::Directory => pending.push(path),
                    EntryKind::File => {
                        let last_modified = self.fs.modified_millis(&path).await?;
                        entries.push(TreeSnapshotEntry {
                            relative_path: path.as_str().to_string(),
                            last_modified,
                        });
                    }
                    EntryKind::Other => debug!("Skipping special entry {}", path),
                }
            }
        }

        debug!("Scanned {} files below {}", entries.len(), start);
        Ok(entries)
    }
}
