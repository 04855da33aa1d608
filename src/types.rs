//! Shared types passed between discovery, the transforms and the build.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::hash;

/// MIME type an artifact is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContentType {
    Html,
    Css,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Html => "text/html",
            ContentType::Css => "text/css",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source file found by discovery.
///
/// Content is not held here: it is read right before its transform runs and
/// dropped once the artifact has been written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Path on disk, including the source root.
    pub path: PathBuf,
    /// Path below the source root, `/`-separated (`notes/today.md`).
    pub relative: String,
    /// Output key the rendered artifact is written and uploaded under.
    pub key: String,
}

/// Final bytes of one output file and the key they are published under.
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub key: String,
    pub content_type: ContentType,
    pub bytes: Vec<u8>,
}

impl RenderedArtifact {
    pub fn new(key: impl Into<String>, content_type: ContentType, bytes: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            content_type,
            bytes,
        }
    }

    /// Content hash of the bytes as they will be published.
    pub fn hash(&self) -> String {
        hash::hash_bytes(&self.bytes)
    }
}
