//! Per-key debouncing work queue.
//!
//! Each key has one pending deadline. Pushing a key again before its
//! deadline pushes the deadline back, so a burst of events for the same key
//! fires the handler once, `delay` after the last event. Every fire runs on
//! its own thread, so a slow handler never delays other keys or the caller.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

type Handler<K> = Arc<dyn Fn(K) + Send + Sync>;

struct State<K> {
    deadlines: HashMap<K, Instant>,
    shutdown: bool,
}

struct Shared<K> {
    state: Mutex<State<K>>,
    wake: Condvar,
    delay: Duration,
    handler: Handler<K>,
}

impl<K> Shared<K> {
    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Coalesces repeated keys and fires a handler once per quiet period.
pub struct Debouncer<K: Eq + Hash + Clone + Send + 'static> {
    shared: Arc<Shared<K>>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl<K: Eq + Hash + Clone + Send + 'static> Debouncer<K> {
    /// Start a debouncer whose scheduler thread calls `handler` for each key
    /// that has been quiet for `delay`.
    pub fn new<F>(delay: Duration, handler: F) -> std::io::Result<Self>
    where
        F: Fn(K) + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                deadlines: HashMap::new(),
                shutdown: false,
            }),
            wake: Condvar::new(),
            delay,
            handler: Arc::new(handler),
        });

        let scheduler_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("librarian-debounce".to_string())
            .spawn(move || run_scheduler(&scheduler_shared))?;

        Ok(Self {
            shared,
            scheduler: Mutex::new(Some(handle)),
        })
    }

    /// Schedule `key`, replacing any pending deadline for it.
    pub fn push(&self, key: K) {
        let mut state = self.shared.lock();
        if state.shutdown {
            return;
        }
        state
            .deadlines
            .insert(key, Instant::now() + self.shared.delay);
        self.shared.wake.notify_one();
    }

    /// Drop a pending key. Returns true if it was pending.
    pub fn cancel(&self, key: &K) -> bool {
        let removed = self.shared.lock().deadlines.remove(key).is_some();
        self.shared.wake.notify_one();
        removed
    }

    /// Number of keys waiting for their deadline.
    pub fn pending(&self) -> usize {
        self.shared.lock().deadlines.len()
    }

    /// Stop the scheduler. Pending keys are discarded; handlers already
    /// running are not waited for.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.lock();
            state.shutdown = true;
            state.deadlines.clear();
        }
        self.shared.wake.notify_all();

        let handle = self
            .scheduler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Debounce scheduler thread panicked");
            }
        }
    }
}

impl<K: Eq + Hash + Clone + Send + 'static> Drop for Debouncer<K> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_scheduler<K: Eq + Hash + Clone + Send + 'static>(shared: &Shared<K>) {
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            return;
        }

        let now = Instant::now();
        let due: Vec<K> = state
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        if !due.is_empty() {
            for key in &due {
                state.deadlines.remove(key);
            }
            drop(state);
            for key in due {
                fire(&shared.handler, key);
            }
            state = shared.lock();
            continue;
        }

        let next = state.deadlines.values().min().copied();
        state = match next {
            Some(next) => {
                let wait = next.saturating_duration_since(now);
                shared
                    .wake
                    .wait_timeout(state, wait)
                    .map(|(guard, _)| guard)
                    .unwrap_or_else(|e| e.into_inner().0)
            }
            None => shared
                .wake
                .wait(state)
                .unwrap_or_else(|e| e.into_inner()),
        };
    }
}

fn fire<K: Send + 'static>(handler: &Handler<K>, key: K) {
    let handler = Arc::clone(handler);
    // The key moves into the closure, so a failed spawn cannot fall back to
    // running inline.
    if let Err(e) = std::thread::Builder::new()
        .name("librarian-sync".to_string())
        .spawn(move || handler(key))
    {
        tracing::error!("Failed to spawn debounced handler: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::sleep;

    fn counting(delay_ms: u64) -> (Debouncer<String>, Arc<Mutex<Vec<String>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let debouncer = Debouncer::new(Duration::from_millis(delay_ms), move |key: String| {
            sink.lock().unwrap().push(key);
        })
        .unwrap();
        (debouncer, fired)
    }

    #[test]
    fn test_burst_fires_once() {
        let (debouncer, fired) = counting(100);
        for _ in 0..5 {
            debouncer.push("a.md".to_string());
            sleep(Duration::from_millis(10));
        }
        assert_eq!(debouncer.pending(), 1);
        sleep(Duration::from_millis(400));
        assert_eq!(*fired.lock().unwrap(), vec!["a.md".to_string()]);
        assert_eq!(debouncer.pending(), 0);
    }

    #[test]
    fn test_keys_are_independent() {
        let (debouncer, fired) = counting(50);
        debouncer.push("a.md".to_string());
        debouncer.push("b.md".to_string());
        sleep(Duration::from_millis(400));
        let mut keys = fired.lock().unwrap().clone();
        keys.sort();
        assert_eq!(keys, vec!["a.md".to_string(), "b.md".to_string()]);
    }

    #[test]
    fn test_repush_resets_deadline() {
        let (debouncer, fired) = counting(300);
        debouncer.push("a.md".to_string());
        sleep(Duration::from_millis(200));
        debouncer.push("a.md".to_string());
        sleep(Duration::from_millis(200));
        assert!(fired.lock().unwrap().is_empty(), "deadline should have moved");
        sleep(Duration::from_millis(500));
        assert_eq!(fired.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_cancel_and_shutdown() {
        let (debouncer, fired) = counting(100);
        debouncer.push("a.md".to_string());
        assert!(debouncer.cancel(&"a.md".to_string()));
        assert!(!debouncer.cancel(&"a.md".to_string()));

        debouncer.push("b.md".to_string());
        debouncer.shutdown();
        debouncer.push("c.md".to_string());
        sleep(Duration::from_millis(300));
        assert!(fired.lock().unwrap().is_empty());
        assert_eq!(debouncer.pending(), 0);
    }

    #[test]
    fn test_slow_handler_does_not_block_other_keys() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);
        let debouncer = Debouncer::new(Duration::from_millis(20), move |key: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            if key == 0 {
                sleep(Duration::from_millis(1000));
            }
        })
        .unwrap();

        debouncer.push(0);
        sleep(Duration::from_millis(100));
        debouncer.push(1);
        sleep(Duration::from_millis(200));
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }
}
