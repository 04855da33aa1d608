//! Build configuration.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. Stock defaults ([`PublishConfig::default`])
//! 2. `sitepush.toml` in the working directory, or the file given with `--config`
//! 3. Command-line flags ([`Overrides`])
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! markdown_dir = "markdown"   # Markdown source root
//! css_dir = "css"             # Stylesheet source root
//! output_dir = "build"        # Build output; stylesheets land in <output_dir>/css
//!
//! [upload]
//! enabled = true              # false = build locally, never write to the store
//! # bucket = "my-site"       # S3 bucket name
//! region = "us-east-2"        # S3 region
//! # directory = "/mnt/site"   # Or: a directory used as the store
//! concurrency = 8             # Parallel uploads per batch
//!
//! [render]
//! generator = "sitepush"      # <meta name="generator"> content
//! date_format = "%A, %d-%b-%y %H:%M:%S UTC"   # Displayed creation date
//! site_title = "Untitled"     # <title> for pages without a level-1 heading
//!
//! [run]
//! # deadline_secs = 600       # Abort the run after this many seconds
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::markdown::RenderOptions;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "sitepush.toml";

const MAX_CONCURRENCY: usize = 256;

/// Region used when `upload.region` is not set.
pub const DEFAULT_REGION: &str = "us-east-2";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Everything a build run needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    /// Markdown source root.
    pub markdown_dir: PathBuf,
    /// Stylesheet source root.
    pub css_dir: PathBuf,
    /// Build output root.
    pub output_dir: PathBuf,
    /// Object store settings.
    pub upload: UploadConfig,
    /// Page rendering settings.
    pub render: RenderConfig,
    /// Run limits.
    pub run: RunConfig,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            markdown_dir: PathBuf::from("markdown"),
            css_dir: PathBuf::from("css"),
            output_dir: PathBuf::from("build"),
            upload: UploadConfig::default(),
            render: RenderConfig::default(),
            run: RunConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// When false, nothing is written to the store.
    pub enabled: bool,
    /// S3 bucket name. One of `bucket` or `directory` is required when
    /// uploading is enabled; with uploading disabled either one turns the
    /// run into a dry run against that store.
    pub bucket: Option<String>,
    /// Region of `bucket`.
    pub region: String,
    /// Directory used as the store: a mounted bucket or a staging tree.
    pub directory: Option<PathBuf>,
    /// Upload tasks per batch.
    pub concurrency: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bucket: None,
            region: DEFAULT_REGION.to_string(),
            directory: None,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Content of `<meta name="generator">`.
    pub generator: String,
    /// strftime format of the displayed creation date.
    pub date_format: String,
    /// `<title>` for pages without a level-1 heading.
    pub site_title: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let options = RenderOptions::default();
        Self {
            generator: options.generator,
            date_format: options.date_format,
            site_title: options.site_title,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Abort the run once it has taken this long.
    pub deadline_secs: Option<u64>,
}

/// Command-line values that replace file values when present.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub markdown_dir: Option<PathBuf>,
    pub css_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub store_dir: Option<PathBuf>,
    pub disable_upload: bool,
    pub concurrency: Option<usize>,
}

impl PublishConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, dir) in [
            ("markdown_dir", &self.markdown_dir),
            ("css_dir", &self.css_dir),
            ("output_dir", &self.output_dir),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!("{name} must not be empty")));
            }
        }
        if self.upload.concurrency == 0 || self.upload.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::Validation(format!(
                "upload.concurrency must be 1-{MAX_CONCURRENCY}"
            )));
        }
        match (&self.upload.bucket, &self.upload.directory) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Validation(
                    "upload.bucket and upload.directory are mutually exclusive".into(),
                ));
            }
            (None, None) if self.upload.enabled => {
                return Err(ConfigError::Validation(
                    "upload.bucket or upload.directory is required when uploading is enabled \
                     (or pass --disable-upload)"
                        .into(),
                ));
            }
            _ => {}
        }
        if self.upload.bucket.as_deref() == Some("") {
            return Err(ConfigError::Validation("upload.bucket must not be empty".into()));
        }
        if self.upload.region.is_empty() {
            return Err(ConfigError::Validation("upload.region must not be empty".into()));
        }
        if StrftimeItems::new(&self.render.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::Validation(format!(
                "render.date_format is not a valid strftime format: {:?}",
                self.render.date_format
            )));
        }
        Ok(())
    }

    /// Apply command-line overrides on top of file values.
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(dir) = &overrides.markdown_dir {
            self.markdown_dir = dir.clone();
        }
        if let Some(dir) = &overrides.css_dir {
            self.css_dir = dir.clone();
        }
        if let Some(dir) = &overrides.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(bucket) = &overrides.bucket {
            self.upload.bucket = Some(bucket.clone());
        }
        if let Some(region) = &overrides.region {
            self.upload.region = region.clone();
        }
        if let Some(dir) = &overrides.store_dir {
            self.upload.directory = Some(dir.clone());
        }
        if let Some(n) = overrides.concurrency {
            self.upload.concurrency = n;
        }
        if overrides.disable_upload {
            self.upload.enabled = false;
        }
        self
    }

    /// Where built stylesheets go.
    pub fn css_output_dir(&self) -> PathBuf {
        self.output_dir.join("css")
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.run.deadline_secs.map(Duration::from_secs)
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            generator: self.render.generator.clone(),
            date_format: self.render.date_format.clone(),
            site_title: self.render.site_title.clone(),
            ..RenderOptions::default()
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(PublishConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` if it does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Load the config file and merge it over stock defaults. Not validated:
/// command-line overrides still have to be applied.
///
/// An explicit `path` must exist; without one, [`DEFAULT_CONFIG_FILE`] is
/// used when present.
pub fn load_config(path: Option<&Path>) -> Result<PublishConfig, ConfigError> {
    let overlay = match path {
        Some(p) => Some(load_raw_config(p)?.ok_or_else(|| ConfigError::NotFound(p.to_path_buf()))?),
        None => load_raw_config(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    let merged = match overlay {
        Some(ov) => merge_toml(stock_defaults_value(), ov),
        None => stock_defaults_value(),
    };
    Ok(merged.try_into()?)
}

/// Returns a fully-commented stock `sitepush.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# sitepush configuration
# ======================
# All settings are optional. Values shown are the defaults.
# Command-line flags override anything set here.
# Unknown keys will cause an error.

# Markdown source root. Every *.md below it becomes <output_dir>/<path>.html
markdown_dir = "markdown"

# Stylesheet source root. Every *.css below it is minified into
# <output_dir>/css/<path>.css and linked from every page.
css_dir = "css"

# Build output root.
output_dir = "build"

# ---------------------------------------------------------------------------
# Publishing
# ---------------------------------------------------------------------------
[upload]
# Set to false (or pass --disable-upload) to build without publishing.
enabled = true

# Where to publish: an S3 bucket, or a directory used as the store (a
# mounted bucket or a staging tree synced by another tool). Exactly one is
# required when uploading is enabled. With uploading disabled, the run still
# compares against the configured store and logs what would change.
# bucket = "my-site"
# directory = "/mnt/site-bucket"

# S3 region of the bucket. Credentials come from AWS_ACCESS_KEY_ID /
# AWS_SECRET_ACCESS_KEY or the shared credentials file.
region = "us-east-2"

# Parallel uploads per batch.
concurrency = 8

# ---------------------------------------------------------------------------
# Rendering
# ---------------------------------------------------------------------------
[render]
# <meta name="generator"> content.
# generator = "sitepush <version>"

# strftime format of the creation date shown under each page title.
date_format = "%A, %d-%b-%y %H:%M:%S UTC"

# <title> for pages without a level-1 heading.
site_title = "Untitled"

# ---------------------------------------------------------------------------
# Run limits
# ---------------------------------------------------------------------------
[run]
# Abort the whole run after this many seconds.
# deadline_secs = 600
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid() -> PublishConfig {
        let mut config = PublishConfig::default();
        config.upload.directory = Some(PathBuf::from("/tmp/bucket"));
        config
    }

    #[test]
    fn default_config_values() {
        let config = PublishConfig::default();
        assert_eq!(config.markdown_dir, PathBuf::from("markdown"));
        assert_eq!(config.css_output_dir(), PathBuf::from("build").join("css"));
        assert!(config.upload.enabled);
        assert_eq!(config.upload.concurrency, 8);
        assert_eq!(config.upload.region, "us-east-2");
        assert_eq!(config.deadline(), None);
    }

    #[test]
    fn parse_partial_config() {
        let toml_str = r#"
output_dir = "public"

[upload]
concurrency = 2
"#;
        let overlay: toml::Value = toml::from_str(toml_str).unwrap();
        let config: PublishConfig = merge_toml(stock_defaults_value(), overlay)
            .try_into()
            .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("public"));
        assert_eq!(config.upload.concurrency, 2);
        // Untouched keys keep defaults
        assert!(config.upload.enabled);
        assert_eq!(config.css_dir, PathBuf::from("css"));
    }

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("sitepush.toml");
        assert!(load_raw_config(&missing).unwrap().is_none());
    }

    #[test]
    fn load_config_explicit_missing_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = load_config(Some(&tmp.path().join("nope.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("site.toml");
        fs::write(
            &path,
            r#"
markdown_dir = "content"

[upload]
bucket = "my-site"
region = "eu-west-1"

[run]
deadline_secs = 30
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.markdown_dir, PathBuf::from("content"));
        assert_eq!(config.upload.bucket.as_deref(), Some("my-site"));
        assert_eq!(config.upload.region, "eu-west-1");
        assert_eq!(config.upload.directory, None);
        assert_eq!(config.deadline(), Some(Duration::from_secs(30)));
        config.validate().unwrap();
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("site.toml");
        fs::write(&path, "output_dir = [").unwrap();
        assert!(matches!(load_config(Some(&path)), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn unknown_key_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("site.toml");
        fs::write(&path, "[upload]\nconcurency = 4\n").unwrap();
        assert!(matches!(load_config(Some(&path)), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let config: PublishConfig = toml::from_str(stock_config_toml()).unwrap();
        let default = PublishConfig::default();
        assert_eq!(config.markdown_dir, default.markdown_dir);
        assert_eq!(config.upload.concurrency, default.upload.concurrency);
        assert_eq!(config.render.date_format, default.render.date_format);
        assert_eq!(config.render.generator, default.render.generator);
        assert_eq!(config.upload.region, default.upload.region);
    }

    #[test]
    fn merge_toml_preserves_base_keys() {
        let base: toml::Value = toml::from_str("[upload]\nenabled = true\nconcurrency = 8").unwrap();
        let overlay: toml::Value = toml::from_str("[upload]\nconcurrency = 3").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["upload"]["enabled"].as_bool(), Some(true));
        assert_eq!(merged["upload"]["concurrency"].as_integer(), Some(3));
    }

    #[test]
    fn overrides_replace_file_values() {
        let config = valid().with_overrides(&Overrides {
            output_dir: Some(PathBuf::from("dist")),
            store_dir: Some(PathBuf::from("/b")),
            region: Some("ap-south-1".into()),
            disable_upload: true,
            concurrency: Some(3),
            ..Overrides::default()
        });
        assert_eq!(config.output_dir, PathBuf::from("dist"));
        assert_eq!(config.upload.directory, Some(PathBuf::from("/b")));
        assert_eq!(config.upload.region, "ap-south-1");
        assert!(!config.upload.enabled);
        assert_eq!(config.upload.concurrency, 3);
        assert_eq!(config.markdown_dir, PathBuf::from("markdown"));
    }

    #[test]
    fn validate_default_with_bucket_passes() {
        valid().validate().unwrap();
    }

    #[test]
    fn validate_upload_requires_bucket() {
        assert!(matches!(
            PublishConfig::default().validate(),
            Err(ConfigError::Validation(_))
        ));
        let mut disabled = PublishConfig::default();
        disabled.upload.enabled = false;
        disabled.validate().unwrap();
    }

    #[test]
    fn validate_bucket_or_directory_not_both() {
        let mut config = valid();
        config.upload.bucket = Some("my-site".into());
        assert!(config.validate().is_err());

        config.upload.directory = None;
        config.validate().unwrap();

        config.upload.region = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_concurrency_bounds() {
        let mut config = valid();
        config.upload.concurrency = 0;
        assert!(config.validate().is_err());
        config.upload.concurrency = MAX_CONCURRENCY + 1;
        assert!(config.validate().is_err());
        config.upload.concurrency = MAX_CONCURRENCY;
        config.validate().unwrap();
    }

    #[test]
    fn validate_empty_dir_rejected() {
        let mut config = valid();
        config.css_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_bad_date_format_rejected() {
        let mut config = valid();
        config.render.date_format = "%Q %Y".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn render_options_follow_config() {
        let mut config = valid();
        config.render.site_title = "Notes".into();
        let options = config.render_options();
        assert_eq!(options.site_title, "Notes");
        assert_eq!(options.source_extension, ".md");
    }
}
