//! # sitepush
//!
//! Builds a static site from a directory of markdown and a directory of CSS,
//! then publishes only what changed to an object store.
//!
//! # Architecture: One Sequential Pass
//!
//! ```text
//! 1. Snapshot   store          →  key → hash of everything published
//! 2. Mirror     sources        →  build/ directory tree
//! 3. Transform  css, markdown  →  minified stylesheets, complete HTML pages
//! 4. Publish    artifacts      →  build/ on disk, changed ones to the store
//! ```
//!
//! Every artifact is fully buffered, hashed, written locally and compared
//! against the snapshot before the next source is read. Only uploads fan out.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`build`] | Orchestrator: discovery, key collisions, the run itself, [`build::BuildReport`] |
//! | [`markdown`] | Markdown → HTML document, metadata header, link rewriting |
//! | [`frontmatter`] | `---` block location, tags and creation date |
//! | [`html`] | String-level HTML edits: head injection, `</h1>` insertion, anchor rewriting |
//! | [`css`] | Minification and page-relative stylesheet paths |
//! | [`mirror`] | Source discovery and build-directory mirroring |
//! | [`store`] | [`store::ObjectStore`] and its directory, dry-run and null implementations |
//! | [`remote`] | S3 object store |
//! | [`snapshot`] | Remote snapshot and the upload decision |
//! | [`upload`] | Bounded, batched parallel uploads |
//! | [`run`] | Ctrl-C and deadline checks |
//! | [`hash`] | Content hashing |
//! | [`config`] | `sitepush.toml` loading, merging, and validation |
//! | [`types`] | Shared types: source documents, artifacts, content types |
//! | [`output`] | CLI summaries of build and check runs |
//!
//! # Design Decisions
//!
//! ## The Store Is the Cache
//!
//! There is no local manifest of what was published. Each run downloads and
//! hashes every object in the store, so a store edited by hand, restored from
//! backup, or published from another machine is always compared correctly.
//! The cost is one full read of the store per run.
//!
//! ## One Store Interface, Chosen Once
//!
//! Disabling upload swaps the store for a [`store::NullStore`] or a
//! [`store::DryRunStore`] at startup. The build itself never asks whether
//! uploading is on.
//!
//! ## Fatal Versus Degraded
//!
//! Anything that would leave the local site wrong stops the run: unreadable
//! sources, a malformed `created:` date, CSS that does not parse, two sources
//! claiming one output key. Anything that only affects publishing is logged
//! and reported instead: an unreadable store means a full republish, a failed
//! upload is retried by the next run.

pub mod build;
pub mod config;
pub mod css;
pub mod frontmatter;
pub mod hash;
pub mod html;
pub mod markdown;
pub mod mirror;
pub mod output;
pub mod remote;
pub mod run;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_helpers;
