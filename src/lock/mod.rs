//! Per-module reader/writer locks.
//!
//! Every registry read takes the module's read lock; every mutation takes
//! its write lock. Read locks are re-entrant per thread: a per-thread depth
//! counter means only the outermost acquisition touches the shared
//! counters, so nested reads during include resolution are free. Write
//! locks are not re-entrant; a second writer fails fast instead of
//! queueing.
//!
//! Waits are bounded: each wait polls the condition variable in 10s slices
//! and gives up after the configured total (120s by default), surfacing
//! `DeadlockSuspected`. A write waiter that already advertised itself rolls
//! its counter back before failing so readers are not blocked forever.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Bounded wait slice between deadlock checks.
const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default total wait before suspecting a deadlock.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(120_000);

/// Lock acquisition failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("lock wait for module {0} timed out, suspecting deadlock")]
    DeadlockSuspected(String),

    #[error("concurrent changes of module {0}")]
    WriteContended(String),
}

#[derive(Default, Debug)]
struct LockCounts {
    readers: usize,
    writers: usize,
}

#[derive(Default, Debug)]
struct ModuleLockState {
    counts: Mutex<LockCounts>,
    changed: Condvar,
}

thread_local! {
    /// Per-thread read-lock depth by module name.
    static LOCAL_READ_DEPTH: RefCell<HashMap<String, usize>> = RefCell::new(HashMap::new());
}

/// Per-module lock table.
#[derive(Debug)]
pub struct LockManager {
    states: Mutex<HashMap<String, Arc<ModuleLockState>>>,
    max_wait: Duration,
    poll_interval: Duration,
}

impl LockManager {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            max_wait,
            poll_interval: POLL_INTERVAL,
        }
    }

    #[cfg(test)]
    fn with_poll_interval(max_wait: Duration, poll_interval: Duration) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            max_wait,
            poll_interval,
        }
    }

    fn state(&self, module: &str) -> Arc<ModuleLockState> {
        let mut states = self.states.lock().unwrap();
        states
            .entry(module.to_string())
            .or_insert_with(|| Arc::new(ModuleLockState::default()))
            .clone()
    }

    /// Acquire the read lock for `module`.
    ///
    /// Nested acquisitions by the same thread return immediately.
    pub fn read(&self, module: &str) -> Result<ReadGuard<'_>, LockError> {
        let depth = LOCAL_READ_DEPTH.with(|m| m.borrow().get(module).copied().unwrap_or(0));
        if depth == 0 {
            let state = self.state(module);
            let mut counts = state.counts.lock().unwrap();
            let start = Instant::now();
            while counts.writers > 0 {
                let (next, _) = state
                    .changed
                    .wait_timeout(counts, self.poll_interval)
                    .unwrap();
                counts = next;
                if start.elapsed() > self.max_wait {
                    return Err(LockError::DeadlockSuspected(module.to_string()));
                }
            }
            counts.readers += 1;
        }
        LOCAL_READ_DEPTH.with(|m| {
            *m.borrow_mut().entry(module.to_string()).or_insert(0) += 1;
        });
        Ok(ReadGuard {
            manager: self,
            module: module.to_string(),
        })
    }

    /// Acquire the exclusive write lock for `module`.
    ///
    /// Fails immediately when another writer holds or awaits the lock, and
    /// with `DeadlockSuspected` when readers do not drain in time.
    pub fn write(&self, module: &str) -> Result<WriteGuard<'_>, LockError> {
        let state = self.state(module);
        let mut counts = state.counts.lock().unwrap();
        if counts.writers > 0 {
            return Err(LockError::WriteContended(module.to_string()));
        }
        counts.writers += 1;
        let start = Instant::now();
        while counts.readers > 0 {
            let (next, _) = state
                .changed
                .wait_timeout(counts, self.poll_interval)
                .unwrap();
            counts = next;
            if start.elapsed() > self.max_wait {
                counts.writers -= 1;
                drop(counts);
                state.changed.notify_all();
                return Err(LockError::DeadlockSuspected(module.to_string()));
            }
        }
        Ok(WriteGuard {
            manager: self,
            module: module.to_string(),
        })
    }

    fn release_read(&self, module: &str) {
        let outermost = LOCAL_READ_DEPTH.with(|m| {
            let mut depths = m.borrow_mut();
            match depths.get_mut(module) {
                Some(depth) if *depth > 0 => {
                    *depth -= 1;
                    if *depth == 0 {
                        depths.remove(module);
                        true
                    } else {
                        false
                    }
                }
                _ => {
                    debug_assert!(false, "release of an unheld read lock on {module}");
                    false
                }
            }
        });
        if outermost {
            let state = self.state(module);
            let mut counts = state.counts.lock().unwrap();
            debug_assert!(counts.readers > 0, "reader count underflow on {module}");
            counts.readers = counts.readers.saturating_sub(1);
            drop(counts);
            state.changed.notify_all();
        }
    }

    fn release_write(&self, module: &str) {
        let state = self.state(module);
        let mut counts = state.counts.lock().unwrap();
        debug_assert!(counts.writers > 0, "writer count underflow on {module}");
        counts.writers = counts.writers.saturating_sub(1);
        drop(counts);
        state.changed.notify_all();
    }
}

/// Held read lock; released on drop.
pub struct ReadGuard<'a> {
    manager: &'a LockManager,
    module: String,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.manager.release_read(&self.module);
    }
}

/// Held write lock; released on drop.
#[derive(Debug)]
pub struct WriteGuard<'a> {
    manager: &'a LockManager,
    module: String,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.manager.release_write(&self.module);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_nested_reads_are_free() {
        let manager = LockManager::new(DEFAULT_MAX_WAIT);
        let outer = manager.read("M").unwrap();
        let inner = manager.read("M").unwrap();
        drop(inner);
        drop(outer);
        // fully released: a writer can proceed
        let w = manager.write("M").unwrap();
        drop(w);
    }

    #[test]
    fn test_write_contention_fails_fast() {
        let manager = LockManager::new(DEFAULT_MAX_WAIT);
        let _held = manager.write("M").unwrap();
        assert_eq!(
            manager.write("M").unwrap_err(),
            LockError::WriteContended("M".to_string())
        );
    }

    #[test]
    fn test_reader_blocks_writer_until_released() {
        let manager = Arc::new(LockManager::new(DEFAULT_MAX_WAIT));
        let read = manager.read("M").unwrap();
        let acquired = Arc::new(AtomicBool::new(false));
        let handle = {
            let manager = Arc::clone(&manager);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let guard = manager.write("M").unwrap();
                acquired.store(true, Ordering::SeqCst);
                drop(guard);
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));
        drop(read);
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_writer_blocks_reader_until_released() {
        let manager = Arc::new(LockManager::new(DEFAULT_MAX_WAIT));
        let write = manager.write("M").unwrap();
        let acquired = Arc::new(AtomicBool::new(false));
        let handle = {
            let manager = Arc::clone(&manager);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let guard = manager.read("M").unwrap();
                acquired.store(true, Ordering::SeqCst);
                drop(guard);
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));
        drop(write);
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_locks_are_per_module() {
        let manager = LockManager::new(DEFAULT_MAX_WAIT);
        let _a = manager.write("A").unwrap();
        let _b = manager.write("B").unwrap();
    }

    #[test]
    fn test_deadlock_suspected_when_readers_never_drain() {
        let manager = LockManager::with_poll_interval(
            Duration::from_millis(30),
            Duration::from_millis(10),
        );
        // this thread holds its own read lock, so the write wait can never
        // make progress and must give up
        let _read = manager.read("M").unwrap();
        let err = manager.write("M").map(|_| ()).unwrap_err();
        assert_eq!(err, LockError::DeadlockSuspected("M".to_string()));
        // the failed writer rolled its counter back: readers still work
        let nested = manager.read("M").unwrap();
        drop(nested);
    }

    #[test]
    fn test_failed_write_wait_unblocks_later_writer() {
        let manager = Arc::new(LockManager::with_poll_interval(
            Duration::from_millis(30),
            Duration::from_millis(10),
        ));
        let read = manager.read("M").unwrap();
        assert!(manager.write("M").is_err());
        drop(read);
        // no stale writer count left behind
        let w = manager.write("M").unwrap();
        drop(w);
    }
}
