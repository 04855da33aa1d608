//! Source discovery and build-directory mirroring.
//!
//! The build output mirrors the source layout one-to-one:
//!
//! ```text
//! markdown/                 build/
//! ├── index.md              ├── index.html
//! └── notes/                ├── notes/
//!     └── today.md          │   └── today.html
//! css/                      └── css/
//! └── site.css                  └── site.css
//! ```
//!
//! Directories are created top-down, one level at a time. A directory that
//! already exists counts as created; anything else that blocks creation
//! (including a regular file sitting at the path) is an error.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A file below a source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Path on disk, including the root.
    pub path: PathBuf,
    /// Path below the root, `/`-separated.
    pub relative: String,
}

/// Counts from one mirroring pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MirrorSummary {
    pub created: usize,
    pub existing: usize,
}

/// `/`-joined form of a relative path, independent of the host separator.
pub fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Every directory below `root` (the root itself included), top-down,
/// as paths relative to `root`.
pub fn source_directories(root: &Path) -> Result<Vec<PathBuf>, MirrorError> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| MirrorError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_dir() {
            let relative = entry.path().strip_prefix(root).unwrap_or(Path::new(""));
            dirs.push(relative.to_path_buf());
        }
    }
    Ok(dirs)
}

/// Create a single build directory.
///
/// Returns `Ok(false)` when it already exists.
pub fn create_build_directory(path: &Path) -> io::Result<bool> {
    match fs::create_dir(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => {
            debug!(dir = %path.display(), "directory already exists");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Replicate the directory tree of `source_root` under `build_root`.
pub fn mirror_directories(
    source_root: &Path,
    build_root: &Path,
) -> Result<MirrorSummary, MirrorError> {
    if let Some(parent) = build_root.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| MirrorError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut summary = MirrorSummary::default();
    for relative in source_directories(source_root)? {
        let target = build_root.join(&relative);
        match create_build_directory(&target) {
            Ok(true) => summary.created += 1,
            Ok(false) => summary.existing += 1,
            Err(source) => return Err(MirrorError::CreateDir { path: target, source }),
        }
    }
    Ok(summary)
}

/// Files below `root` whose extension matches `extension` (no dot,
/// case-insensitive), sorted by path.
pub fn discover_files(root: &Path, extension: &str) -> Result<Vec<DiscoveredFile>, MirrorError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| MirrorError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .map(|e| e.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if !matches {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        files.push(DiscoveredFile {
            path: entry.path().to_path_buf(),
            relative: relative_key(relative),
        });
    }
    Ok(files)
}
