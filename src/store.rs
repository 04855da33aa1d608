//! Object store client interface and implementations.
//!
//! The build only needs three operations from a remote store: list every
//! object, fetch one body, and write one body. [`ObjectStore`] captures that
//! surface so the build never branches on "is upload enabled"; the binary
//! picks an implementation once at startup:
//!
//! | Store | Reads | Writes |
//! |-------|-------|--------|
//! | [`S3Store`](crate::remote::S3Store) | objects in an S3 bucket | objects in the bucket |
//! | [`DirectoryStore`] | files under a root directory | files under the root |
//! | [`DryRunStore`] | delegated to the wrapped store | logged, discarded |
//! | [`NullStore`] | always empty | discarded |
//!
//! Keys are `/`-separated relative paths without a leading slash. A key that
//! ends in `/` is a directory marker, not an object.

use crate::types::ContentType;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::info;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(String),
    #[error("Failed to list objects: {0}")]
    List(String),
    #[error("Failed to get object {key}: {source}")]
    Get {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to put object {key}: {source}")]
    Put {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("Invalid object key {0:?}")]
    InvalidKey(String),
    #[error("Upload of {0} cancelled")]
    Cancelled(String),
}

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub is_directory_marker: bool,
}

impl ObjectEntry {
    pub fn object(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            is_directory_marker: false,
        }
    }

    pub fn marker(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            is_directory_marker: true,
        }
    }
}

/// Narrow client interface consumed by the build.
///
/// `Send + Sync` because upload batches call [`ObjectStore::put`] from a
/// worker pool.
pub trait ObjectStore: Send + Sync {
    /// Every object currently stored, directory markers included.
    fn list(&self) -> Result<Vec<ObjectEntry>, StoreError>;
    /// Full body of one object.
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;
    /// Create or replace one object.
    fn put(&self, key: &str, content_type: ContentType, body: &[u8]) -> Result<(), StoreError>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for Box<S> {
    fn list(&self) -> Result<Vec<ObjectEntry>, StoreError> {
        (**self).list()
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, content_type: ContentType, body: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, content_type, body)
    }
}

/// A directory used as a bucket: a mounted bucket, or a staging tree that an
/// external sync tool publishes.
///
/// Directories are listed as `key/` markers. Content types are not persisted.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a key to a path below the root, rejecting keys that would
    /// escape it.
    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for DirectoryStore {
    fn list(&self) -> Result<Vec<ObjectEntry>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| StoreError::List(e.to_string()))?;
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| StoreError::List(e.to_string()))?;
            let key = crate::mirror::relative_key(relative);
            if entry.file_type().is_dir() {
                entries.push(ObjectEntry::marker(format!("{key}/")));
            } else {
                entries.push(ObjectEntry::object(key));
            }
        }
        Ok(entries)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(key)?;
        fs::read(&path).map_err(|source| StoreError::Get {
            key: key.to_string(),
            source,
        })
    }

    fn put(&self, key: &str, _content_type: ContentType, body: &[u8]) -> Result<(), StoreError> {
        let path = self.object_path(key)?;
        let to_err = |source| StoreError::Put {
            key: key.to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(to_err)?;
        }
        fs::write(&path, body).map_err(to_err)
    }
}

/// Store for runs with uploading disabled and no store configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl ObjectStore for NullStore {
    fn list(&self) -> Result<Vec<ObjectEntry>, StoreError> {
        Ok(Vec::new())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        Err(StoreError::Get {
            key: key.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "null store holds no objects"),
        })
    }

    fn put(&self, _key: &str, _content_type: ContentType, _body: &[u8]) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Reads from the wrapped store; writes are logged and dropped.
///
/// Used when uploading is disabled but a store is configured, so a run
/// still reports exactly what it would publish.
#[derive(Debug, Clone)]
pub struct DryRunStore<S> {
    inner: S,
}

impl<S: ObjectStore> DryRunStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: ObjectStore> ObjectStore for DryRunStore<S> {
    fn list(&self) -> Result<Vec<ObjectEntry>, StoreError> {
        self.inner.list()
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, content_type: ContentType, body: &[u8]) -> Result<(), StoreError> {
        info!(key, content_type = %content_type, bytes = body.len(), "dry run: skipping upload");
        Ok(())
    }
}
