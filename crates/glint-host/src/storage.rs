//! Removable storage implementations
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::trace;

use crate::capabilities::Storage;
use crate::error::StorageError;

/// Serves a mount path (e.g. `/sdcard`) from a host directory
#[derive(Debug, Clone)]
pub struct DirStorage {
    mount: PathBuf,
    root: PathBuf,
}

impl DirStorage {
    pub fn new(mount: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            mount: mount.into(),
            root: root.into(),
        }
    }

    /// Host path backing a device path, if it lies under the mount
    pub fn host_path(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.mount)
            .ok()
            .map(|relative| self.root.join(relative))
    }
}

impl Storage for DirStorage {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        let host = self
            .host_path(path)
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))?;
        trace!(target: "modules", "read {} -> {}", path.display(), host.display());
        fs::read(&host).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
            _ => StorageError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.host_path(path).is_some_and(|host| host.is_file())
    }
}

/// In-memory storage that records every read attempt
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    attempts: Mutex<Vec<PathBuf>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, contents: Vec<u8>) {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into(), contents);
    }

    pub fn remove(&self, path: &Path) -> bool {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path)
            .is_some()
    }

    /// Paths passed to `read_file`, oldest first
    pub fn attempted(&self) -> Vec<PathBuf> {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Storage for MemoryStorage {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.to_path_buf());
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(path)
    }
}
