//! Shared test utilities for the sitepush test suite.
//!
//! Provides a fixture site, a matching config and lookups into build output.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixtures();
//! let config = fixture_config(&tmp);
//! let report = Builder::new(config.clone(), Box::new(NullStore)).run().unwrap();
//!
//! let page = read_output(&config.output_dir, "notes/first-post.html");
//! assert!(page.contains("../css/site.css"));
//! ```

use std::path::Path;
use tempfile::TempDir;

use crate::config::PublishConfig;
use crate::upload::UploadFailure;

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` (`markdown/` and `css/`) to a temp directory and
/// return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Config pointing at a fixture copy: `markdown/`, `css/`, output in `build/`,
/// uploading disabled, two uploads per batch.
pub fn fixture_config(tmp: &TempDir) -> PublishConfig {
    let mut config = PublishConfig {
        markdown_dir: tmp.path().join("markdown"),
        css_dir: tmp.path().join("css"),
        output_dir: tmp.path().join("build"),
        ..PublishConfig::default()
    };
    config.upload.enabled = false;
    config.upload.concurrency = 2;
    config
}

/// Write a file, creating parent directories.
pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

// =========================================================================
// Output lookups: panic with a clear message on miss
// =========================================================================

/// Read a built artifact by key. Panics if it was not written.
pub fn read_output(output_dir: &Path, key: &str) -> String {
    let path = output_dir.join(key);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("output '{key}' not readable at {}: {e}", path.display()))
}

/// Find the failure recorded for a key. Panics if the key did not fail.
pub fn find_failure<'a>(failures: &'a [UploadFailure], key: &str) -> &'a UploadFailure {
    failures.iter().find(|f| f.key == key).unwrap_or_else(|| {
        let keys: Vec<&str> = failures.iter().map(|f| f.key.as_str()).collect();
        panic!("no failure for '{key}'. Failed: {keys:?}")
    })
}
