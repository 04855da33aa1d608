//! Bounded concurrent upload dispatch.
//!
//! Artifacts that need publishing are queued as they are produced. When the
//! queue holds `concurrency` artifacts it is flushed as one batch: every
//! artifact becomes one task on a dedicated [rayon](https://docs.rs/rayon)
//! pool of `concurrency` threads.
//!
//! A batch shares one cancellation flag. The first failing task sets it, tasks
//! that have not started yet are skipped, and the batch still waits for every
//! task before reporting. The first error (in completion order) is surfaced
//! in [`BatchReport::first_error`]. Tasks skipped because the run itself was
//! stopped are reported through [`BatchReport::stopped`].
//!
//! The queue bounds memory too: at most `concurrency` artifact bodies are
//! held between production and upload.

use crate::run::{RunGuard, Stop};
use crate::store::{ObjectStore, StoreError};
use crate::types::RenderedArtifact;
use rayon::ThreadPool;
use serde::Serialize;
use rayon::prelude::*;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{error, info, warn};

/// A key whose upload did not happen, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFailure {
    pub key: String,
    pub error: String,
}

/// Outcome of one batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub uploaded: Vec<String>,
    pub failed: Vec<UploadFailure>,
    pub first_error: Option<StoreError>,
    /// Set when tasks were skipped because the run was interrupted or ran
    /// out of time.
    pub stopped: Option<Stop>,
}

pub struct Uploader<'a> {
    store: &'a dyn ObjectStore,
    pool: ThreadPool,
    concurrency: usize,
    guard: RunGuard,
    pending: Vec<RenderedArtifact>,
}

impl<'a> Uploader<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        concurrency: usize,
        guard: RunGuard,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let concurrency = concurrency.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .thread_name(|i| format!("sitepush-upload-{i}"))
            .build()?;
        Ok(Self {
            store,
            pool,
            concurrency,
            guard,
            pending: Vec::with_capacity(concurrency),
        })
    }

    /// Queue an artifact; dispatches a batch once the queue is full.
    pub fn queue(&mut self, artifact: RenderedArtifact) -> Option<BatchReport> {
        self.pending.push(artifact);
        if self.pending.len() >= self.concurrency {
            Some(self.flush())
        } else {
            None
        }
    }

    /// Dispatch whatever is queued.
    pub fn flush(&mut self) -> BatchReport {
        let batch = std::mem::take(&mut self.pending);
        if batch.is_empty() {
            return BatchReport::default();
        }
        self.dispatch(&batch)
    }

    fn dispatch(&self, batch: &[RenderedArtifact]) -> BatchReport {
        let cancelled = AtomicBool::new(false);
        let first_failure = AtomicUsize::new(usize::MAX);
        let stopped = OnceLock::new();

        let results: Vec<Result<(), StoreError>> = self.pool.install(|| {
            batch
                .par_iter()
                .enumerate()
                .map(|(index, artifact)| {
                    if cancelled.load(Ordering::SeqCst) {
                        return Err(StoreError::Cancelled(artifact.key.clone()));
                    }
                    if let Err(stop) = self.guard.check() {
                        let _ = stopped.set(stop);
                        return Err(StoreError::Cancelled(artifact.key.clone()));
                    }
                    let result = self
                        .store
                        .put(&artifact.key, artifact.content_type, &artifact.bytes);
                    if result.is_err() {
                        cancelled.store(true, Ordering::SeqCst);
                        let _ = first_failure.compare_exchange(
                            usize::MAX,
                            index,
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        );
                    }
                    result
                })
                .collect()
        });

        let first_index = first_failure.load(Ordering::SeqCst);
        let mut report = BatchReport {
            stopped: stopped.into_inner(),
            ..BatchReport::default()
        };
        for (index, (artifact, result)) in batch.iter().zip(results).enumerate() {
            match result {
                Ok(()) => {
                    info!(key = %artifact.key, content_type = %artifact.content_type, "uploaded");
                    report.uploaded.push(artifact.key.clone());
                }
                Err(e) => {
                    match &e {
                        StoreError::Cancelled(_) => {
                            warn!(key = %artifact.key, "upload skipped: batch cancelled")
                        }
                        _ => error!(key = %artifact.key, error = %e, "upload failed"),
                    }
                    report.failed.push(UploadFailure {
                        key: artifact.key.clone(),
                        error: e.to_string(),
                    });
                    let surfaced = index == first_index
                        || (first_index == usize::MAX && report.first_error.is_none());
                    if surfaced {
                        report.first_error = Some(e);
                    }
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectEntry;
    use crate::types::ContentType;
    use std::collections::HashSet;
    use std::io;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        puts: Mutex<Vec<String>>,
        fail: HashSet<String>,
    }

    impl ObjectStore for Recording {
        fn list(&self) -> Result<Vec<ObjectEntry>, StoreError> {
            Ok(Vec::new())
        }
        fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
            Err(StoreError::Get {
                key: key.into(),
                source: io::Error::from(io::ErrorKind::NotFound),
            })
        }
        fn put(&self, key: &str, _: ContentType, _: &[u8]) -> Result<(), StoreError> {
            if self.fail.contains(key) {
                return Err(StoreError::Put {
                    key: key.into(),
                    source: io::Error::other("denied"),
                });
            }
            self.puts.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    fn artifact(key: &str) -> RenderedArtifact {
        RenderedArtifact::new(key, ContentType::Html, key.as_bytes().to_vec())
    }

    #[test]
    fn queue_flushes_when_full() {
        let store = Recording::default();
        let mut up = Uploader::new(&store, 2, RunGuard::default()).unwrap();

        assert!(up.queue(artifact("a.html")).is_none());
        let report = up.queue(artifact("b.html")).expect("second artifact fills the batch");
        assert_eq!(report.uploaded, vec!["a.html", "b.html"]);
        assert!(report.failed.is_empty());
        assert!(up.flush().uploaded.is_empty());
    }

    #[test]
    fn flush_sends_partial_batch() {
        let store = Recording::default();
        let mut up = Uploader::new(&store, 8, RunGuard::default()).unwrap();
        up.queue(artifact("a.html"));
        let report = up.flush();
        assert_eq!(report.uploaded, vec!["a.html"]);
        assert_eq!(store.puts.lock().unwrap().len(), 1);
    }

    #[test]
    fn failure_is_reported_and_surfaced() {
        let store = Recording {
            fail: ["bad.html".to_string()].into_iter().collect(),
            ..Recording::default()
        };
        let mut up = Uploader::new(&store, 1, RunGuard::default()).unwrap();
        let report = up.queue(artifact("bad.html")).unwrap();

        assert!(report.uploaded.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key, "bad.html");
        assert!(matches!(report.first_error, Some(StoreError::Put { .. })));
    }

    #[test]
    fn every_task_accounted_for_after_failure() {
        let store = Recording {
            fail: ["b.html".to_string()].into_iter().collect(),
            ..Recording::default()
        };
        let mut up = Uploader::new(&store, 4, RunGuard::default()).unwrap();
        for key in ["a.html", "b.html", "c.html"] {
            up.queue(artifact(key));
        }
        let report = up.flush();

        assert_eq!(report.uploaded.len() + report.failed.len(), 3);
        assert!(report.failed.iter().any(|f| f.key == "b.html"));
        assert!(matches!(report.first_error, Some(StoreError::Put { .. })));
    }

    #[test]
    fn interrupted_run_skips_uploads() {
        let store = Recording::default();
        let guard = RunGuard::default();
        guard.interrupt();
        let mut up = Uploader::new(&store, 2, guard).unwrap();
        up.queue(artifact("a.html"));
        let report = up.flush();

        assert!(report.uploaded.is_empty());
        assert!(matches!(report.first_error, Some(StoreError::Cancelled(_))));
        assert_eq!(report.stopped, Some(Stop::Interrupted));
        assert!(store.puts.lock().unwrap().is_empty());
    }

    #[test]
    fn failure_cancellation_is_not_a_stop() {
        let store = Recording {
            fail: ["a.html".to_string()].into_iter().collect(),
            ..Recording::default()
        };
        let mut up = Uploader::new(&store, 1, RunGuard::default()).unwrap();
        let report = up.queue(artifact("a.html")).unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.stopped, None);
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let store = Recording::default();
        let mut up = Uploader::new(&store, 0, RunGuard::default()).unwrap();
        assert!(up.queue(artifact("a.html")).is_some());
    }
}
