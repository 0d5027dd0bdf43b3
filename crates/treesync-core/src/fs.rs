use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::SyncError;
use crate::path::SafePath;

/// Byte stream of a file opened for download.
pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Anything the scanner must not descend into or report (sockets,
    /// dangling or directory symlinks).
    Other,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntryInfo {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Filesystem collaborator used by the gateway and the scanner.
///
/// Every path is relative to the backend's root. Implementations must not
/// spawn processes or interpret path strings beyond joining components.
#[async_trait]
pub trait FileOperations: Send + Sync {
    /// Create a single directory; the parent must already exist.
    async fn create_dir(&self, path: &SafePath) -> Result<(), SyncError>;

    /// Create a directory and any missing ancestors.
    async fn create_dir_all(&self, path: &SafePath) -> Result<(), SyncError>;

    /// Remove a file, or a directory with everything below it.
    async fn remove_recursive(&self, path: &SafePath) -> Result<(), SyncError>;

    /// Remove a directory only if it has no entries.
    async fn remove_empty_dir(&self, path: &SafePath) -> Result<(), SyncError>;

    /// Move a file from outside the tree (an upload staging area) to `dest`,
    /// replacing any existing file.
    async fn move_into(&self, source: &Path, dest: &SafePath) -> Result<(), SyncError>;

    async fn read_dir(&self, path: &SafePath) -> Result<Vec<DirEntryInfo>, SyncError>;

    /// Modification time in Unix millis.
    async fn modified_millis(&self, path: &SafePath) -> Result<i64, SyncError>;

    async fn set_modified_millis(&self, path: &SafePath, millis: i64) -> Result<(), SyncError>;

    async fn open_read(&self, path: &SafePath) -> Result<FileReader, SyncError>;
}
