//! In-memory `FileOperations` used by the core unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::fs::{DirEntryInfo, EntryKind, FileOperations, FileReader};
use crate::path::SafePath;

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File { data: Vec<u8>, modified: i64 },
    /// Socket, device or anything else that is neither file nor directory.
    Special,
}

#[derive(Debug, Default)]
pub struct MemoryFileOperations {
    nodes: Mutex<BTreeMap<String, Node>>,
    staged: Mutex<HashMap<PathBuf, Vec<u8>>>,
    pinned: Mutex<HashSet<String>>,
}

fn missing(path: &SafePath) -> SyncError {
    SyncError::NotFound(path.to_string())
}

fn failure(op: &'static str, path: &SafePath, kind: io::ErrorKind) -> SyncError {
    SyncError::from_io(op, path, io::Error::from(kind))
}

impl MemoryFileOperations {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.nodes.lock().unwrap().insert(String::new(), Node::Dir);
        fs
    }

    /// Create a directory and its ancestors.
    pub fn add_dir(&self, path: &str) {
        let path = SafePath::parse(path).unwrap();
        let mut nodes = self.nodes.lock().unwrap();
        let mut current = Some(path);
        while let Some(p) = current {
            nodes.entry(p.as_str().to_string()).or_insert(Node::Dir);
            current = p.parent();
        }
    }

    pub fn add_file(&self, path: &str, data: &[u8], modified: i64) {
        let path = SafePath::parse(path).unwrap();
        if let Some(parent) = path.parent() {
            self.add_dir(parent.as_str());
        }
        self.nodes.lock().unwrap().insert(
            path.as_str().to_string(),
            Node::File {
                data: data.to_vec(),
                modified,
            },
        );
    }

    pub fn add_special(&self, path: &str) {
        let path = SafePath::parse(path).unwrap();
        if let Some(parent) = path.parent() {
            self.add_dir(parent.as_str());
        }
        self.nodes
            .lock()
            .unwrap()
            .insert(path.as_str().to_string(), Node::Special);
    }

    /// Make `remove_empty_dir` fail on `path` with a permission error.
    pub fn deny_removal(&self, path: &str) {
        self.pinned.lock().unwrap().insert(path.to_string());
    }

    pub fn stage(&self, path: &Path, data: &[u8]) {
        self.staged
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), data.to_vec());
    }

    pub fn exists(&self, path: &str) -> bool {
        self.nodes.lock().unwrap().contains_key(path)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.nodes.lock().unwrap().get(path), Some(Node::Dir))
    }

    pub fn file_data(&self, path: &str) -> Option<Vec<u8>> {
        match self.nodes.lock().unwrap().get(path) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    fn children_of<'a>(
        nodes: &'a BTreeMap<String, Node>,
        path: &'a SafePath,
    ) -> impl Iterator<Item = (&'a String, &'a Node)> + 'a {
        nodes.iter().filter(move |(key, _)| {
            !key.is_empty()
                && SafePath::parse(key).ok().and_then(|p| p.parent()).as_ref() == Some(path)
        })
    }

    fn parent_is_dir(nodes: &BTreeMap<String, Node>, path: &SafePath) -> bool {
        path.parent()
            .map(|p| matches!(nodes.get(p.as_str()), Some(Node::Dir)))
            .unwrap_or(false)
    }
}

#[async_trait]
impl FileOperations for MemoryFileOperations {
    async fn create_dir(&self, path: &SafePath) -> Result<(), SyncError> {
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.contains_key(path.as_str()) {
            return Err(failure("mkdir", path, io::ErrorKind::AlreadyExists));
        }
        if !Self::parent_is_dir(&nodes, path) {
            return Err(missing(path));
        }
        nodes.insert(path.as_str().to_string(), Node::Dir);
        Ok(())
    }

    async fn create_dir_all(&self, path: &SafePath) -> Result<(), SyncError> {
        if let Some(Node::File { .. }) = self.nodes.lock().unwrap().get(path.as_str()) {
            return Err(failure("mkdir", path, io::ErrorKind::AlreadyExists));
        }
        self.add_dir(path.as_str());
        Ok(())
    }

    async fn remove_recursive(&self, path: &SafePath) -> Result<(), SyncError> {
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.remove(path.as_str()).is_none() {
            return Err(missing(path));
        }
        let prefix = format!("{}/", path.as_str());
        nodes.retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }

    async fn remove_empty_dir(&self, path: &SafePath) -> Result<(), SyncError> {
        if self.pinned.lock().unwrap().contains(path.as_str()) {
            return Err(failure("rmdir", path, io::ErrorKind::PermissionDenied));
        }
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get(path.as_str()) {
            Some(Node::Dir) => {}
            Some(_) => return Err(failure("rmdir", path, io::ErrorKind::Other)),
            None => return Err(missing(path)),
        }
        if Self::children_of(&nodes, path).next().is_some() {
            return Err(failure("rmdir", path, io::ErrorKind::Other));
        }
        nodes.remove(path.as_str());
        Ok(())
    }

    async fn move_into(&self, source: &Path, dest: &SafePath) -> Result<(), SyncError> {
        let data = self
            .staged
            .lock()
            .unwrap()
            .remove(source)
            .ok_or_else(|| SyncError::NotFound(source.display().to_string()))?;
        let mut nodes = self.nodes.lock().unwrap();
        if !Self::parent_is_dir(&nodes, dest) {
            return Err(missing(dest));
        }
        if let Some(Node::Dir) = nodes.get(dest.as_str()) {
            return Err(failure("rename", dest, io::ErrorKind::Other));
        }
        nodes.insert(dest.as_str().to_string(), Node::File { data, modified: 0 });
        Ok(())
    }

    async fn read_dir(&self, path: &SafePath) -> Result<Vec<DirEntryInfo>, SyncError> {
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(path.as_str()) {
            Some(Node::Dir) => {}
            Some(_) => return Err(failure("readdir", path, io::ErrorKind::Other)),
            None => return Err(missing(path)),
        }
        Ok(Self::children_of(&nodes, path)
            .map(|(key, node)| {
                let name = key.rsplit('/').next().unwrap_or(key);
                let kind = match node {
                    Node::Dir => EntryKind::Directory,
                    Node::File { .. } => EntryKind::File,
                    Node::Special => EntryKind::Other,
                };
                DirEntryInfo::new(name, kind)
            })
            .collect())
    }

    async fn modified_millis(&self, path: &SafePath) -> Result<i64, SyncError> {
        match self.nodes.lock().unwrap().get(path.as_str()) {
            Some(Node::File { modified, .. }) => Ok(*modified),
            Some(_) => Ok(0),
            None => Err(missing(path)),
        }
    }

    async fn set_modified_millis(&self, path: &SafePath, millis: i64) -> Result<(), SyncError> {
        match self.nodes.lock().unwrap().get_mut(path.as_str()) {
            Some(Node::File { modified, .. }) => {
                *modified = millis;
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(missing(path)),
        }
    }

    async fn open_read(&self, path: &SafePath) -> Result<FileReader, SyncError> {
        match self.nodes.lock().unwrap().get(path.as_str()) {
            Some(Node::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(_) => Err(failure("open", path, io::ErrorKind::Other)),
            None => Err(missing(path)),
        }
    }
}
