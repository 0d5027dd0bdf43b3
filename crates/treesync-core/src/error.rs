use std::fmt::Display;
use std::io;

/// Reasons a client-supplied path is refused before any filesystem access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path contains forbidden character {0:?}")]
    ForbiddenCharacter(char),

    #[error("path escapes the synchronized root")]
    ParentTraversal,

    #[error("path must be relative to the synchronized root")]
    Absolute,

    #[error("path must name an entry below the root")]
    Empty,
}

/// Errors raised by the session, scanner and gateway layers.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Session is held by another device")]
    Conflict,

    #[error("Rejected path: {0}")]
    RejectedPath(#[from] PathError),

    #[error("{0}: no such file or directory")]
    NotFound(String),

    #[error("{0}: permission denied")]
    AccessDenied(String),

    #[error("{op} failed for {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },
}

impl SyncError {
    /// Classify an I/O failure on `path`, keeping missing and forbidden
    /// entries distinguishable from other failures.
    pub fn from_io(op: &'static str, path: impl Display, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => Self::AccessDenied(path.to_string()),
            _ => Self::Io {
                op,
                path: path.to_string(),
                source,
            },
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}
