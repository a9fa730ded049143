//! Full reconciliation scan.
//!
//! One thread walks the vault and feeds classified files into a bounded job
//! channel. A fixed pool of workers parses and writes them, each keeping its
//! own counts, and an aggregator sums the per-worker counts once every
//! worker has been joined.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ignore::WalkBuilder;
use serde::Serialize;

use crate::indexer::{Indexer, SyncOutcome};
use crate::metadata::FileKind;

/// Error type for full scans. Per-file failures never show up here.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Directory walk failed: {0}")]
    Walk(#[from] ignore::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Vault root is not a directory: {0}")]
    NotADirectory(PathBuf),
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// Files synced by a scan, by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanCounts {
    pub notes: usize,
    pub code: usize,
    pub assets: usize,
    /// Files that failed to parse or write.
    pub failed: usize,
    /// Files walked but not indexed.
    pub ignored: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ScanCounts {
    /// Files successfully synced.
    pub fn synced(&self) -> usize {
        self.notes + self.code + self.assets
    }

    fn record(&mut self, kind: FileKind) {
        match kind {
            FileKind::Markdown => self.notes += 1,
            FileKind::Code => self.code += 1,
            FileKind::Asset => self.assets += 1,
            FileKind::Ignore => self.ignored += 1,
        }
    }

    fn merge(&mut self, other: &ScanCounts) {
        self.notes += other.notes;
        self.code += other.code;
        self.assets += other.assets;
        self.failed += other.failed;
        self.ignored += other.ignored;
    }
}

struct Job {
    path: PathBuf,
    rel_path: String,
    kind: FileKind,
}

/// Bulk sync of every indexable file under the vault root.
pub struct FullScanner {
    indexer: Arc<Indexer>,
    workers: usize,
}

impl FullScanner {
    /// A scanner with one worker per logical CPU.
    pub fn new(indexer: Arc<Indexer>) -> Self {
        Self {
            indexer,
            workers: num_cpus::get().max(1),
        }
    }

    /// Override the pool size. Zero keeps the CPU count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        if workers > 0 {
            self.workers = workers;
        }
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Walk the vault and sync every indexable file.
    ///
    /// Individual file failures are logged and counted in
    /// [`ScanCounts::failed`]. Only a failure of the walk itself is returned
    /// as an error.
    pub fn full_scan(&self) -> Result<ScanCounts> {
        let started = Instant::now();
        let root = self.indexer.classifier().root().to_path_buf();
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root));
        }
        tracing::info!("Scanning {} with {} workers", root.display(), self.workers);

        let mut counts = std::thread::scope(|scope| -> Result<ScanCounts> {
            let (job_tx, job_rx) = mpsc::sync_channel::<Job>(self.workers * 4);
            let job_rx = Arc::new(Mutex::new(job_rx));
            let (result_tx, result_rx) = mpsc::sync_channel::<ScanCounts>(self.workers);

            let aggregator = std::thread::Builder::new()
                .name("librarian-scan-aggregate".to_string())
                .spawn_scoped(scope, move || {
                    let mut total = ScanCounts::default();
                    for partial in result_rx {
                        total.merge(&partial);
                    }
                    total
                })?;

            let mut workers = Vec::with_capacity(self.workers);
            for id in 0..self.workers {
                let jobs = Arc::clone(&job_rx);
                let results = result_tx.clone();
                let indexer = &self.indexer;
                let handle = std::thread::Builder::new()
                    .name(format!("librarian-scan-{}", id))
                    .spawn_scoped(scope, move || {
                        let local = run_worker(indexer, &jobs);
                        if results.send(local).is_err() {
                            tracing::error!("Scan aggregator exited early");
                        }
                    })?;
                workers.push(handle);
            }
            drop(result_tx);

            let walked = self.dispatch(&job_tx);
            drop(job_tx);

            for worker in workers {
                if worker.join().is_err() {
                    tracing::error!("Scan worker panicked");
                }
            }
            let total = aggregator.join().unwrap_or_default();

            let ignored = walked?;
            Ok(ScanCounts { ignored: total.ignored + ignored, ..total })
        })?;

        counts.elapsed = started.elapsed();
        tracing::info!(
            "Scan complete in {:.2?}: {} notes, {} code, {} assets ({} failed, {} ignored)",
            counts.elapsed,
            counts.notes,
            counts.code,
            counts.assets,
            counts.failed,
            counts.ignored,
        );
        Ok(counts)
    }

    /// Walk the vault, queueing every tracked file. Returns the number of
    /// files that were walked but not queued.
    fn dispatch(&self, jobs: &SyncSender<Job>) -> Result<usize> {
        let classifier = self.indexer.classifier().clone();
        let filter = classifier.clone();

        let walker = WalkBuilder::new(classifier.root())
            .hidden(true)
            .parents(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                entry.depth() == 0 || !filter.is_excluded(entry.path(), is_dir)
            })
            .build();

        let mut ignored = 0;
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.into_path();
            let kind = classifier.classify(&path);
            let Some(rel_path) = classifier.relative_path(&path).filter(|_| kind.is_tracked()) else {
                ignored += 1;
                continue;
            };
            if jobs.send(Job { path, rel_path, kind }).is_err() {
                tracing::error!("All scan workers exited; stopping walk");
                break;
            }
        }
        Ok(ignored)
    }
}

fn run_worker(indexer: &Indexer, jobs: &Mutex<Receiver<Job>>) -> ScanCounts {
    let mut local = ScanCounts::default();
    loop {
        let job = {
            let receiver = jobs.lock().unwrap_or_else(|e| e.into_inner());
            receiver.recv()
        };
        let Ok(job) = job else {
            return local;
        };
        match indexer.sync_file(&job.path, &job.rel_path, job.kind) {
            Ok(SyncOutcome::Synced(kind)) => local.record(kind),
            Ok(_) => local.ignored += 1,
            Err(e) => {
                tracing::warn!("Failed to sync {}: {}", job.rel_path, e);
                local.failed += 1;
            }
        }
    }
}
