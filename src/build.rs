//! Build orchestration: sources in, local site and uploads out.
//!
//! One run, in order:
//!
//! ```text
//! discover   markdown/ + css/         → source documents, output keys checked unique
//! snapshot   store                    → key → hash of everything published
//! mirror     markdown/, css/          → build/, build/css/
//! css        css/**/*.css             → minify → build/css/… → upload if changed
//! pages      markdown/**/*.md         → html + stylesheets + links → build/… → upload if changed
//! flush      pending uploads          → BuildReport
//! ```
//!
//! Processing is sequential. The only fan-out is upload dispatch, handled by
//! [`Uploader`]. Upload failures are degraded: they are logged and reported
//! but never fail the run. Everything else that goes wrong is fatal and
//! returned as a [`BuildError`].

use crate::config::PublishConfig;
use crate::css::{self, CssError};
use crate::frontmatter::{self, FrontMatterError};
use crate::html::{self, HtmlError};
use crate::markdown::MarkdownTransform;
use crate::mirror::{self, MirrorError};
use crate::run::{RunGuard, Stop};
use crate::snapshot::{RemoteSnapshot, should_upload};
use crate::store::ObjectStore;
use crate::types::{ContentType, RenderedArtifact, SourceDocument};
use crate::upload::{BatchReport, UploadFailure, Uploader};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Prefix of every stylesheet key, and the stylesheet directory below the
/// output root.
pub const CSS_KEY_PREFIX: &str = "css";

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Mirror(#[from] MirrorError),
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    FrontMatter {
        path: PathBuf,
        #[source]
        source: FrontMatterError,
    },
    #[error("{path}: {source}")]
    Css {
        path: PathBuf,
        #[source]
        source: CssError,
    },
    #[error("{path}: {source}")]
    Html {
        path: PathBuf,
        #[source]
        source: HtmlError,
    },
    #[error("Output key {key} produced by both {first} and {second}")]
    DuplicateKey {
        key: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("Build interrupted")]
    Cancelled,
    #[error("Build deadline exceeded")]
    DeadlineExceeded,
    #[error("Failed to start upload workers: {0}")]
    UploadPool(#[from] rayon::ThreadPoolBuildError),
}

impl From<Stop> for BuildError {
    fn from(stop: Stop) -> Self {
        match stop {
            Stop::Interrupted => BuildError::Cancelled,
            Stop::DeadlineExceeded => BuildError::DeadlineExceeded,
        }
    }
}

/// Every source of one run, keys already checked for collisions.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    pub documents: Vec<SourceDocument>,
    pub stylesheets: Vec<SourceDocument>,
}

/// What a build run did.
#[derive(Debug, Default, Serialize)]
pub struct BuildReport {
    /// Keys written to the store, in completion order per batch.
    pub uploaded: Vec<String>,
    /// Keys whose bytes already match the store.
    pub unchanged: Vec<String>,
    /// Keys whose upload failed or was skipped after a failure.
    pub failed: Vec<UploadFailure>,
    /// Key → hash of every artifact written locally.
    pub local_hashes: BTreeMap<String, String>,
    /// Objects found in the store at the start of the run.
    pub remote_objects: usize,
    /// The store could not be read; everything was treated as changed.
    pub snapshot_degraded: bool,
    /// Uploading was disabled: `uploaded` lists what would have been written.
    pub dry_run: bool,
}

impl BuildReport {
    /// Fold a batch into the report. Returns why the run stopped if the batch
    /// skipped uploads for that reason.
    fn absorb(&mut self, batch: BatchReport) -> Option<Stop> {
        self.uploaded.extend(batch.uploaded);
        self.failed.extend(batch.failed);
        if let Some(e) = batch.first_error {
            warn!(error = %e, "upload batch failed");
        }
        batch.stopped
    }
}

/// Result of a source check.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub documents: usize,
    pub stylesheets: usize,
    /// Documents with no `created:` line.
    pub undated: Vec<String>,
    /// Documents whose front matter is never closed.
    pub unterminated: Vec<String>,
}

pub struct Builder {
    config: PublishConfig,
    transform: MarkdownTransform,
    store: Box<dyn ObjectStore>,
    guard: RunGuard,
}

impl Builder {
    /// The guard's deadline starts counting now.
    pub fn new(config: PublishConfig, store: Box<dyn ObjectStore>) -> Self {
        let transform = MarkdownTransform::new(config.render_options());
        let guard = RunGuard::new(config.deadline());
        Self {
            config,
            transform,
            store,
            guard,
        }
    }

    pub fn with_guard(mut self, guard: RunGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    /// Find every source and compute its output key. Fails on the first key
    /// produced by two sources, before anything is written.
    pub fn discover(&self) -> Result<SourceSet, BuildError> {
        let options = self.transform.options();
        let source_ext = options.source_extension.trim_start_matches('.');
        let target_ext = options.target_extension.trim_start_matches('.');

        let documents: Vec<SourceDocument> =
            mirror::discover_files(&self.config.markdown_dir, source_ext)?
                .into_iter()
                .map(|file| SourceDocument {
                    key: page_key(&file.relative, target_ext),
                    path: file.path,
                    relative: file.relative,
                })
                .collect();

        let stylesheets: Vec<SourceDocument> = mirror::discover_files(&self.config.css_dir, "css")?
            .into_iter()
            .map(|file| SourceDocument {
                key: stylesheet_key(&file.relative),
                path: file.path,
                relative: file.relative,
            })
            .collect();

        ensure_unique_keys(documents.iter().chain(&stylesheets))?;
        debug!(
            documents = documents.len(),
            stylesheets = stylesheets.len(),
            "sources discovered"
        );
        Ok(SourceSet {
            documents,
            stylesheets,
        })
    }

    /// Discovery and front-matter parsing only. Writes nothing and never
    /// touches the store.
    pub fn check(&self) -> Result<CheckReport, BuildError> {
        let sources = self.discover()?;
        let mut report = CheckReport {
            documents: sources.documents.len(),
            stylesheets: sources.stylesheets.len(),
            ..CheckReport::default()
        };
        for doc in &sources.documents {
            self.guard.check()?;
            let text = read_source(&doc.path)?;
            if frontmatter::locate(&text) == frontmatter::Block::Unterminated {
                warn!(path = %doc.relative, "front matter is never closed");
                report.unterminated.push(doc.relative.clone());
            }
            let front_matter = frontmatter::parse(&text).map_err(|source| BuildError::FrontMatter {
                path: doc.path.clone(),
                source,
            })?;
            if front_matter.created.is_none() {
                report.undated.push(doc.relative.clone());
            }
        }
        Ok(report)
    }

    /// Build the site and publish whatever changed.
    pub fn run(&self) -> Result<BuildReport, BuildError> {
        let sources = self.discover()?;
        let mut report = BuildReport {
            dry_run: !self.config.upload.enabled,
            ..BuildReport::default()
        };

        let remote = match RemoteSnapshot::fetch(self.store.as_ref()) {
            Ok(snapshot) if snapshot.is_empty() => {
                info!("remote store is empty; every artifact will be uploaded");
                snapshot
            }
            Ok(snapshot) => {
                info!(objects = snapshot.len(), "remote snapshot fetched");
                snapshot
            }
            Err(e) => {
                warn!(error = %e, "could not read remote store; treating every artifact as changed");
                report.snapshot_degraded = true;
                RemoteSnapshot::empty()
            }
        };
        report.remote_objects = remote.len();

        let output_dir = &self.config.output_dir;
        let css_output = self.config.css_output_dir();
        let pages = mirror::mirror_directories(&self.config.markdown_dir, output_dir)?;
        let styles = mirror::mirror_directories(&self.config.css_dir, &css_output)?;
        debug!(
            created = pages.created + styles.created,
            existing = pages.existing + styles.existing,
            "build directories ready"
        );

        let mut uploader = Uploader::new(
            self.store.as_ref(),
            self.config.upload.concurrency,
            self.guard.clone(),
        )?;

        for sheet in &sources.stylesheets {
            self.guard.check()?;
            let artifact = self.build_stylesheet(sheet)?;
            self.publish(artifact, &remote, &mut uploader, &mut report)?;
        }

        // Pages link every stylesheet present in the output, not only the
        // ones built by this run.
        let built_styles: Vec<String> = mirror::discover_files(&css_output, "css")?
            .into_iter()
            .map(|file| stylesheet_key(&file.relative))
            .collect();

        for doc in &sources.documents {
            self.guard.check()?;
            let artifact = self.build_page(doc, &built_styles)?;
            self.publish(artifact, &remote, &mut uploader, &mut report)?;
        }

        if let Some(stop) = report.absorb(uploader.flush()) {
            return Err(stop.into());
        }

        info!(
            uploaded = report.uploaded.len(),
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            "build complete"
        );
        debug!(hashes = ?report.local_hashes, "local artifact hashes");
        Ok(report)
    }

    fn build_stylesheet(&self, sheet: &SourceDocument) -> Result<RenderedArtifact, BuildError> {
        let source = read_source(&sheet.path)?;
        let minified = css::minify(&source).map_err(|source| BuildError::Css {
            path: sheet.path.clone(),
            source,
        })?;
        debug!(path = %sheet.relative, before = source.len(), after = minified.len(), "stylesheet minified");
        Ok(RenderedArtifact::new(
            &sheet.key,
            ContentType::Css,
            minified.into_bytes(),
        ))
    }

    fn build_page(
        &self,
        doc: &SourceDocument,
        stylesheets: &[String],
    ) -> Result<RenderedArtifact, BuildError> {
        let source = read_source(&doc.path)?;
        let draft = self
            .transform
            .to_html(&doc.relative, &source)
            .map_err(|source| BuildError::FrontMatter {
                path: doc.path.clone(),
                source,
            })?;

        let hrefs: Vec<String> = stylesheets
            .iter()
            .map(|sheet| css::stylesheet_href(&doc.key, sheet))
            .collect();
        let styled = html::inject_stylesheets(&draft.html, &hrefs).map_err(|source| {
            BuildError::Html {
                path: doc.path.clone(),
                source,
            }
        })?;
        let page = self.transform.rewrite_links(&styled);

        Ok(RenderedArtifact::new(
            &doc.key,
            ContentType::Html,
            page.into_bytes(),
        ))
    }

    /// Write locally, record the hash, and queue the upload if the store
    /// holds different bytes.
    fn publish(
        &self,
        artifact: RenderedArtifact,
        remote: &RemoteSnapshot,
        uploader: &mut Uploader<'_>,
        report: &mut BuildReport,
    ) -> Result<(), BuildError> {
        let path = self.config.output_dir.join(&artifact.key);
        fs::write(&path, &artifact.bytes).map_err(|source| BuildError::Io {
            path: path.clone(),
            source,
        })?;

        let digest = artifact.hash();
        let changed = should_upload(remote, &artifact.key, &digest);
        report
            .local_hashes
            .insert(artifact.key.clone(), digest);

        if changed {
            debug!(key = %artifact.key, "changed; queued for upload");
            if let Some(batch) = uploader.queue(artifact)
                && let Some(stop) = report.absorb(batch)
            {
                return Err(stop.into());
            }
        } else {
            debug!(key = %artifact.key, "unchanged");
            report.unchanged.push(artifact.key);
        }
        Ok(())
    }
}

/// Output key of a page: the source path with its extension replaced.
pub fn page_key(relative: &str, target_extension: &str) -> String {
    let stem_end = match relative.rfind('.') {
        Some(dot) if !relative[dot..].contains('/') => dot,
        _ => relative.len(),
    };
    format!("{}.{}", &relative[..stem_end], target_extension)
}

/// Output key of a stylesheet: the source path below `css/`.
pub fn stylesheet_key(relative: &str) -> String {
    format!("{CSS_KEY_PREFIX}/{relative}")
}

fn ensure_unique_keys<'a>(
    sources: impl IntoIterator<Item = &'a SourceDocument>,
) -> Result<(), BuildError> {
    let mut seen: HashMap<&str, &Path> = HashMap::new();
    for source in sources {
        if let Some(first) = seen.insert(&source.key, &source.path) {
            return Err(BuildError::DuplicateKey {
                key: source.key.clone(),
                first: first.to_path_buf(),
                second: source.path.clone(),
            });
        }
    }
    Ok(())
}

fn read_source(path: &Path) -> Result<String, BuildError> {
    fs::read_to_string(path).map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })
}
