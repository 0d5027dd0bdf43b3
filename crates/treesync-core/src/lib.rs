//! Core types and logic for the treesync file-synchronization server.
//!
//! This crate knows nothing about HTTP or about a concrete filesystem:
//! - `SafePath`: validated, root-relative paths
//! - `SessionLock`: exclusive write session for one device at a time
//! - `SyncWatermark`: monotonic "last touch" timestamp
//! - `FileOperations`: filesystem collaborator interface
//! - `TreeScanner`: recursive `(path, mtime)` snapshot of a subtree
//! - `SyncGateway`: orchestrates the above for every sync operation
//! - `AccessControl`: bearer-token membership check

mod access;
mod clock;
mod error;
mod fs;
mod gateway;
mod path;
mod scan;
mod session;
mod watermark;

#[cfg(test)]
mod test_support;

pub use access::AccessControl;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{PathError, SyncError};
pub use fs::{DirEntryInfo, EntryKind, FileOperations, FileReader};
pub use gateway::{BatchOutcome, FileDownload, SyncGateway, UploadedFile};
pub use path::{sanitize, SafePath, FORBIDDEN_CHARACTERS};
pub use scan::{TreeScanner, TreeSnapshotEntry};
pub use session::{SessionLock, SessionView, DEFAULT_SESSION_TIMEOUT};
pub use watermark::SyncWatermark;
