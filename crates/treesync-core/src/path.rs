//! Validation of client-supplied, root-relative paths.
//!
//! Names are opaque strings: spaces and other characters are kept as-is
//! since no operation goes through a shell. The characters below are still
//! refused so that older clients relying on them as markers fail loudly.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::PathError;

/// Characters that are never accepted in a path.
pub const FORBIDDEN_CHARACTERS: [char; 5] = ['|', '\n', '\\', '#', '\0'];

/// A path relative to the synchronized root, with `/` separators.
///
/// The empty path designates the root itself. A `SafePath` never contains
/// `..`, `.` or empty components and never starts with `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SafePath(String);

/// Validate and normalize a raw client path.
pub fn sanitize(raw: &str) -> Result<SafePath, PathError> {
    SafePath::parse(raw)
}

impl SafePath {
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if let Some(c) = raw.chars().find(|c| FORBIDDEN_CHARACTERS.contains(c)) {
            return Err(PathError::ForbiddenCharacter(c));
        }

        // Paths are root-relative: one leading slash is tolerated.
        let trimmed = raw.strip_prefix('/').unwrap_or(raw);
        if trimmed.starts_with('/') {
            return Err(PathError::Absolute);
        }

        let mut components = Vec::new();
        for component in trimmed.split('/') {
            match component {
                "" | "." => continue,
                ".." => return Err(PathError::ParentTraversal),
                other => components.push(other),
            }
        }

        Ok(Self(components.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Fails with `PathError::Empty` when the path is the root itself.
    pub fn require_entry(self) -> Result<Self, PathError> {
        if self.is_root() {
            Err(PathError::Empty)
        } else {
            Ok(self)
        }
    }

    /// Append a raw relative path, validating it the same way as `parse`.
    pub fn join(&self, raw: &str) -> Result<Self, PathError> {
        let tail = Self::parse(raw)?;
        Ok(match (self.is_root(), tail.is_root()) {
            (_, true) => self.clone(),
            (true, false) => tail,
            (false, false) => Self(format!("{}/{}", self.0, tail.0)),
        })
    }

    /// Join a single directory entry name read back from the filesystem.
    pub fn child(&self, name: &str) -> Self {
        if self.is_root() {
            Self(name.to_string())
        } else {
            Self(format!("{}/{}", self.0, name))
        }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(match self.0.rsplit_once('/') {
            Some((parent, _)) => Self(parent.to_string()),
            None => Self::root(),
        })
    }

    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            None
        } else {
            self.0.rsplit('/').next()
        }
    }

    /// Absolute location of this path below `root`.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut resolved = root.to_path_buf();
        for component in self.0.split('/').filter(|c| !c.is_empty()) {
            resolved.push(component);
        }
        resolved
    }
}

impl fmt::Display for SafePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            f.write_str(&self.0)
        }
    }
}
