//! Live vault watcher.
//!
//! OS events are read on a single intake thread, filtered, and pushed into a
//! [`Debouncer`] keyed by path. Each debounced fire syncs its path on its own
//! thread through the [`Indexer`]. Directories are watched one at a time
//! (non-recursively) so hidden and excluded trees never get a watch.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use ignore::WalkBuilder;
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::debounce::Debouncer;
use crate::indexer::{Indexer, SyncOutcome};

/// Error type for file watcher operations.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Watcher is already running")]
    AlreadyRunning,
    #[error("Vault root is not a directory: {0}")]
    NotADirectory(PathBuf),
}

pub type Result<T> = std::result::Result<T, WatchError>;

/// How often the intake loop checks for a stop request.
const INTAKE_POLL: Duration = Duration::from_millis(200);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Watches the vault and keeps the graph in sync.
pub struct VaultWatcher {
    indexer: Arc<Indexer>,
    debounce: Duration,
    running: Mutex<Option<Running>>,
}

struct Running {
    intake: Arc<Intake>,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// State shared between `start`, the intake loop, and `stop`.
struct Intake {
    indexer: Arc<Indexer>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched: Mutex<HashSet<PathBuf>>,
    debouncer: Debouncer<PathBuf>,
}

impl VaultWatcher {
    pub fn new(indexer: Arc<Indexer>, debounce: Duration) -> Self {
        Self {
            indexer,
            debounce,
            running: Mutex::new(None),
        }
    }

    /// Begin watching. Returns once the initial watch set is registered.
    pub fn start(&self) -> Result<()> {
        let mut running = lock(&self.running);
        if running.is_some() {
            return Err(WatchError::AlreadyRunning);
        }

        let root = self.indexer.classifier().root().to_path_buf();
        if !root.is_dir() {
            return Err(WatchError::NotADirectory(root));
        }

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let watcher = notify::recommended_watcher(tx)?;

        let fire_indexer = Arc::clone(&self.indexer);
        let debouncer = Debouncer::new(self.debounce, move |path: PathBuf| {
            process(&fire_indexer, &path)
        })?;

        let intake = Arc::new(Intake {
            indexer: Arc::clone(&self.indexer),
            watcher: Mutex::new(Some(watcher)),
            watched: Mutex::new(HashSet::new()),
            debouncer,
        });

        intake.watch_dir(&root)?;
        intake.watch_tree(&root, false);

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let intake = Arc::clone(&intake);
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name("librarian-watch".to_string())
                .spawn(move || intake.run(rx, &stop))?
        };

        tracing::info!(
            "Watching {} ({} directories)",
            root.display(),
            lock(&intake.watched).len()
        );
        *running = Some(Running {
            intake,
            stop,
            thread,
        });
        Ok(())
    }

    /// Stop watching and release the OS handle. In-flight syncs are not
    /// waited for. Calling `stop` on a stopped watcher does nothing.
    pub fn stop(&self) {
        let Some(running) = lock(&self.running).take() else {
            return;
        };
        running.stop.store(true, Ordering::SeqCst);
        drop(lock(&running.intake.watcher).take());
        running.intake.debouncer.shutdown();
        if running.thread.join().is_err() {
            tracing::error!("Watch intake thread panicked");
        }
        tracing::info!("Watcher stopped");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Number of directories with an OS watch.
    pub fn watched_dirs(&self) -> usize {
        lock(&self.running)
            .as_ref()
            .map_or(0, |r| lock(&r.intake.watched).len())
    }

    /// Paths waiting for their debounce deadline.
    pub fn pending(&self) -> usize {
        lock(&self.running)
            .as_ref()
            .map_or(0, |r| r.intake.debouncer.pending())
    }
}

impl Drop for VaultWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Intake {
    fn run(&self, rx: Receiver<notify::Result<Event>>, stop: &AtomicBool) {
        while !stop.load(Ordering::SeqCst) {
            match rx.recv_timeout(INTAKE_POLL) {
                Ok(Ok(event)) => self.handle(event),
                Ok(Err(e)) => tracing::warn!("Watch error: {}", e),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn handle(&self, event: Event) {
        match event.kind {
            EventKind::Access(_) => {}
            EventKind::Create(CreateKind::Folder) => {
                for path in &event.paths {
                    self.on_dir_created(path);
                }
            }
            EventKind::Remove(RemoveKind::Folder) => {
                for path in &event.paths {
                    self.on_dir_removed(path);
                }
            }
            EventKind::Remove(_) => {
                for path in &event.paths {
                    if lock(&self.watched).contains(path) {
                        self.on_dir_removed(path);
                    } else {
                        self.on_file(path);
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                // Renames arrive as one event per side or one with both
                // paths. Each side is handled by what exists now.
                for path in &event.paths {
                    self.on_renamed(path);
                }
            }
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any | EventKind::Other => {
                for path in &event.paths {
                    if path.is_dir() {
                        if matches!(event.kind, EventKind::Create(_)) {
                            self.on_dir_created(path);
                        }
                    } else {
                        self.on_file(path);
                    }
                }
            }
        }
    }

    fn on_renamed(&self, path: &Path) {
        if path.is_dir() {
            self.on_dir_created(path);
        } else if lock(&self.watched).contains(path) {
            self.on_dir_removed(path);
        } else {
            self.on_file(path);
        }
    }

    fn on_file(&self, path: &Path) {
        if self.indexer.classifier().classify(path).is_tracked() {
            self.debouncer.push(path.to_path_buf());
        }
    }

    fn on_dir_created(&self, path: &Path) {
        if self.indexer.classifier().is_excluded(path, true) {
            return;
        }
        if let Err(e) = self.watch_dir(path) {
            tracing::warn!("Cannot watch {}: {}", path.display(), e);
            return;
        }
        // Files may have landed before the watch existed.
        self.watch_tree(path, true);
    }

    fn on_dir_removed(&self, path: &Path) {
        let dropped: Vec<PathBuf> = {
            let mut watched = lock(&self.watched);
            let dropped = watched.iter().filter(|dir| dir.starts_with(path)).cloned().collect();
            watched.retain(|dir| !dir.starts_with(path));
            dropped
        };
        if let Some(watcher) = lock(&self.watcher).as_mut() {
            for dir in &dropped {
                // The OS usually drops the watch along with the directory.
                if let Err(e) = watcher.unwatch(dir) {
                    tracing::debug!("Unwatch {} failed: {}", dir.display(), e);
                }
            }
        }

        let indexer = Arc::clone(&self.indexer);
        let dir = path.to_path_buf();
        let spawned = std::thread::Builder::new()
            .name("librarian-sync".to_string())
            .spawn(move || {
                if let Err(e) = indexer.remove_dir(&dir) {
                    tracing::warn!("Failed to remove {}: {}", dir.display(), e);
                }
            });
        if let Err(e) = spawned {
            tracing::error!("Failed to spawn directory removal: {}", e);
        }
    }

    fn watch_dir(&self, dir: &Path) -> Result<()> {
        let mut watcher = lock(&self.watcher);
        let Some(watcher) = watcher.as_mut() else {
            return Ok(());
        };
        if lock(&self.watched).contains(dir) {
            return Ok(());
        }
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        lock(&self.watched).insert(dir.to_path_buf());
        Ok(())
    }

    /// Register every non-excluded directory below `root`. With
    /// `queue_files`, tracked files found along the way are queued too.
    fn watch_tree(&self, root: &Path, queue_files: bool) {
        let classifier = self.indexer.classifier().clone();
        let filter = classifier.clone();
        let walker = WalkBuilder::new(root)
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

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                if entry.depth() > 0 {
                    if let Err(e) = self.watch_dir(entry.path()) {
                        tracing::warn!("Cannot watch {}: {}", entry.path().display(), e);
                    }
                }
            } else if queue_files && file_type.is_file() {
                self.on_file(entry.path());
            }
        }
    }
}

/// Debounced handler: sync one path, logging instead of failing.
fn process(indexer: &Indexer, path: &Path) {
    match indexer.sync_path(path) {
        Ok(SyncOutcome::Synced(kind)) => {
            tracing::info!("Updated {} ({})", path.display(), kind.as_str());
        }
        Ok(SyncOutcome::Deleted) => tracing::info!("Removed {}", path.display()),
        Ok(SyncOutcome::Skipped) => {}
        Err(e) => tracing::warn!("Failed to sync {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::config::VaultConfig;
    use crate::store::{GraphStore, RecordingExecutor};
    use std::fs;
    use std::thread::sleep;
    use std::time::Instant;
    use tempfile::tempdir;

    fn watcher(root: &Path, debounce_ms: u64) -> (VaultWatcher, Arc<RecordingExecutor>) {
        let executor = Arc::new(RecordingExecutor::new());
        let store = Arc::new(GraphStore::new(executor.clone(), "test"));
        let classifier = Classifier::new(&VaultConfig::new(root)).unwrap();
        let indexer = Arc::new(Indexer::new(store, classifier));
        (
            VaultWatcher::new(indexer, Duration::from_millis(debounce_ms)),
            executor,
        )
    }

    fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            sleep(Duration::from_millis(50));
        }
        condition()
    }

    #[test]
    fn test_start_twice_and_stop_idempotent() {
        let dir = tempdir().unwrap();
        let (watcher, _) = watcher(dir.path(), 50);

        watcher.start().expect("first start");
        assert!(watcher.is_running());
        assert!(matches!(watcher.start(), Err(WatchError::AlreadyRunning)));

        watcher.stop();
        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[test]
    fn test_hidden_and_excluded_dirs_not_watched() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("notes/daily")).unwrap();
        fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        let (watcher, _) = watcher(dir.path(), 50);

        watcher.start().unwrap();
        // root, notes, notes/daily
        assert_eq!(watcher.watched_dirs(), 3);
        watcher.stop();
    }

    #[test]
    fn test_file_change_is_synced() {
        let dir = tempdir().unwrap();
        let (watcher, executor) = watcher(dir.path(), 100);
        watcher.start().unwrap();

        fs::write(dir.path().join("new.md"), "# New\n[[Other]]\n").unwrap();
        assert!(
            wait_for(Duration::from_secs(5), || !executor
                .matching("MERGE (n:Note {path: $path})")
                .is_empty()),
            "note should be upserted"
        );
        watcher.stop();
    }

    #[test]
    fn test_rapid_saves_coalesce() {
        let dir = tempdir().unwrap();
        let (watcher, executor) = watcher(dir.path(), 400);
        watcher.start().unwrap();

        let path = dir.path().join("busy.md");
        for i in 0..5 {
            fs::write(&path, format!("# Draft {}\n", i)).unwrap();
            sleep(Duration::from_millis(20));
        }
        assert!(wait_for(Duration::from_secs(5), || !executor
            .matching("MERGE (n:Note {path: $path})")
            .is_empty()));
        sleep(Duration::from_millis(600));
        assert_eq!(executor.matching("MERGE (n:Note {path: $path})").len(), 1);
        watcher.stop();
    }

    #[test]
    fn test_new_directory_is_watched_and_scanned() {
        let dir = tempdir().unwrap();
        let (watcher, executor) = watcher(dir.path(), 100);
        watcher.start().unwrap();
        let before = watcher.watched_dirs();

        let sub = dir.path().join("projects/alpha");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("plan.md"), "# Plan").unwrap();

        assert!(wait_for(Duration::from_secs(5), || executor
            .statements()
            .iter()
            .any(|s| s.contains("path='projects/alpha/plan.md'"))));
        assert!(wait_for(Duration::from_secs(2), || watcher.watched_dirs() >= before + 2));
        watcher.stop();
    }

    #[test]
    fn test_removed_file_is_deleted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("old.md");
        fs::write(&path, "# Old").unwrap();
        let (watcher, executor) = watcher(dir.path(), 100);
        watcher.start().unwrap();

        fs::remove_file(&path).unwrap();
        assert!(wait_for(Duration::from_secs(5), || !executor
            .matching("MATCH (n {path: $path}) DETACH DELETE n")
            .is_empty()));
        watcher.stop();
    }

    #[test]
    fn test_removed_directory_is_unwatched_and_deleted() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("projects/alpha")).unwrap();
        fs::write(dir.path().join("projects/alpha/plan.md"), "# Plan").unwrap();
        let (watcher, executor) = watcher(dir.path(), 100);
        watcher.start().unwrap();
        assert_eq!(watcher.watched_dirs(), 3);

        fs::remove_dir_all(dir.path().join("projects")).unwrap();
        assert!(wait_for(Duration::from_secs(5), || watcher.watched_dirs() == 1));
        assert!(wait_for(Duration::from_secs(5), || !executor
            .matching("prefix='projects/'")
            .is_empty()));
        assert!(watcher.is_running());
        watcher.stop();
    }

    #[test]
    fn test_ignored_files_produce_no_writes() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        let (watcher, executor) = watcher(dir.path(), 50);
        watcher.start().unwrap();

        fs::write(dir.path().join("notes.txt"), "plain").unwrap();
        fs::write(dir.path().join("node_modules/x.js"), "x").unwrap();
        sleep(Duration::from_millis(500));
        assert!(executor.statements().is_empty());
        watcher.stop();
    }
}
