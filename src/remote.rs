//! Amazon S3 (and S3-compatible) object store.
//!
//! Credentials come from the usual AWS sources: `AWS_ACCESS_KEY_ID` /
//! `AWS_SECRET_ACCESS_KEY`, the shared credentials file, or instance
//! metadata. Calls block; parallelism comes from the upload pool.

use crate::store::{ObjectEntry, ObjectStore, StoreError};
use crate::types::ContentType;
use s3::Bucket;
use s3::Region;
use s3::creds::Credentials;
use std::io;
use tracing::debug;

pub struct S3Store {
    bucket: Box<Bucket>,
}

impl S3Store {
    /// Open `bucket` in `region` with credentials from the environment.
    pub fn open(bucket: &str, region: &str) -> Result<Self, StoreError> {
        let credentials = Credentials::default().map_err(|e| StoreError::Open(e.to_string()))?;
        Self::with_credentials(bucket, region, credentials)
    }

    pub fn with_credentials(
        bucket: &str,
        region: &str,
        credentials: Credentials,
    ) -> Result<Self, StoreError> {
        let region: Region = region
            .parse()
            .map_err(|e| StoreError::Open(format!("invalid region {region:?}: {e}")))?;
        let bucket = Bucket::new(bucket, region, credentials)
            .map_err(|e| StoreError::Open(e.to_string()))?;
        Ok(Self { bucket })
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket.name
    }
}

/// Keys ending in `/` are the console's "folders", not objects.
fn entry_for_key(key: String) -> ObjectEntry {
    if key.ends_with('/') {
        ObjectEntry::marker(key)
    } else {
        ObjectEntry::object(key)
    }
}

/// Non-2xx responses come back as `Ok`; turn them into errors.
fn check_status(status: u16) -> Result<(), io::Error> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(io::Error::other(format!("HTTP status {status}")))
    }
}

impl ObjectStore for S3Store {
    fn list(&self) -> Result<Vec<ObjectEntry>, StoreError> {
        let pages = self
            .bucket
            .list(String::new(), None)
            .map_err(|e| StoreError::List(e.to_string()))?;
        let entries: Vec<ObjectEntry> = pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| entry_for_key(object.key))
            .collect();
        debug!(bucket = %self.bucket.name, objects = entries.len(), "bucket listed");
        Ok(entries)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let to_err = |source| StoreError::Get {
            key: key.to_string(),
            source,
        };
        let response = self
            .bucket
            .get_object(key)
            .map_err(|e| to_err(io::Error::other(e.to_string())))?;
        check_status(response.status_code()).map_err(to_err)?;
        Ok(response.bytes().to_vec())
    }

    fn put(&self, key: &str, content_type: ContentType, body: &[u8]) -> Result<(), StoreError> {
        let to_err = |source| StoreError::Put {
            key: key.to_string(),
            source,
        };
        let response = self
            .bucket
            .put_object_with_content_type(key, body, content_type.as_str())
            .map_err(|e| to_err(io::Error::other(e.to_string())))?;
        check_status(response.status_code()).map_err(to_err)
    }
}
