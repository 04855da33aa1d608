//! Remote snapshot and the upload decision.
//!
//! At the start of every run the build downloads every object in the store
//! and hashes it with the same function used for local artifacts. The
//! resulting key → hash map is the only source of truth for "what is
//! published": it is never updated during the run and is dropped at the end.
//!
//! Downloading every body is the expensive step of a run. Store-side
//! checksums (ETags and the like) are never consulted.

use crate::hash;
use crate::store::{ObjectStore, StoreError};
use std::collections::BTreeMap;
use tracing::debug;

/// Key → content hash of every object in the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSnapshot {
    hashes: BTreeMap<String, String>,
}

impl RemoteSnapshot {
    /// Snapshot with no objects, which makes every artifact look changed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// List the store, skip directory markers, and hash every object body.
    pub fn fetch(store: &dyn ObjectStore) -> Result<Self, StoreError> {
        let mut hashes = BTreeMap::new();
        for entry in store.list()? {
            if entry.is_directory_marker || entry.key.ends_with('/') {
                continue;
            }
            let body = store.get(&entry.key)?;
            let digest = hash::hash_bytes(&body);
            debug!(key = %entry.key, hash = %digest, "remote object");
            hashes.insert(entry.key, digest);
        }
        Ok(Self { hashes })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.hashes.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

impl FromIterator<(String, String)> for RemoteSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            hashes: iter.into_iter().collect(),
        }
    }
}

/// Whether the artifact at `key` with hash `local_hash` must be uploaded:
/// the key is unknown to the remote, or the remote bytes differ.
pub fn should_upload(remote: &RemoteSnapshot, key: &str, local_hash: &str) -> bool {
    match remote.get(key) {
        Some(remote_hash) => remote_hash != local_hash,
        None => true,
    }
}
