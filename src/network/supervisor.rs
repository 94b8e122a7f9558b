//! Child lifecycle management
//!
//! A small dynamic supervisor: children are monitored worker threads added
//! and removed at runtime. The restart policy is transient — a child that
//! returns `Err` or panics is restarted (with a bounded retry budget), a
//! child that returns `Ok` has finished its job and is dropped.

use crate::error::Result;
use log::{debug, error, warn};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// A supervised unit of work. Re-invoked on restart.
pub type ChildFn = Box<dyn FnMut() -> Result<()> + Send + 'static>;

const MAX_RESTARTS: u32 = 3;
const RESTART_DELAY_MS: u64 = 200;

#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    children: Mutex<HashMap<u64, String>>,
    next_id: AtomicU64,
    shutdown: AtomicBool,
}

impl Supervisor {
    pub fn new(name: &str) -> Supervisor {
        Supervisor {
            inner: Arc::new(Inner {
                name: name.to_string(),
                children: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn a monitored child. Returns its id for later removal.
    pub fn add_child(&self, label: &str, mut child: ChildFn) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut children) = self.inner.children.lock() {
            children.insert(id, label.to_string());
        }

        let inner = Arc::clone(&self.inner);
        let label = label.to_string();
        thread::spawn(move || {
            let mut restarts = 0;
            loop {
                if inner.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                match catch_unwind(AssertUnwindSafe(&mut child)) {
                    Ok(Ok(())) => {
                        debug!("{}: child {label} finished", inner.name);
                        break;
                    }
                    Ok(Err(e)) => {
                        if inner.shutdown.load(Ordering::SeqCst) {
                            break;
                        }
                        restarts += 1;
                        if restarts > MAX_RESTARTS {
                            error!(
                                "{}: child {label} failed {restarts} times, giving up: {e}",
                                inner.name
                            );
                            break;
                        }
                        warn!("{}: restarting child {label} after failure: {e}", inner.name);
                        thread::sleep(Duration::from_millis(RESTART_DELAY_MS));
                    }
                    Err(_) => {
                        restarts += 1;
                        if restarts > MAX_RESTARTS {
                            error!("{}: child {label} panicked repeatedly, giving up", inner.name);
                            break;
                        }
                        warn!("{}: restarting child {label} after panic", inner.name);
                        thread::sleep(Duration::from_millis(RESTART_DELAY_MS));
                    }
                }
            }
            if let Ok(mut children) = inner.children.lock() {
                children.remove(&id);
            }
        });

        id
    }

    /// Forget a child. Its thread winds down on its own once the work it
    /// watches (typically a socket) is gone.
    pub fn remove_child(&self, id: u64) {
        if let Ok(mut children) = self.inner.children.lock() {
            children.remove(&id);
        }
    }

    pub fn child_count(&self) -> usize {
        self.inner
            .children
            .lock()
            .map(|children| children.len())
            .unwrap_or(0)
    }

    /// Stop restarting. Running children observe the flag at their next
    /// restart boundary.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainError;
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    fn wait_until(deadline_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(deadline_ms) {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_finished_child_is_removed() {
        let supervisor = Supervisor::new("test");
        supervisor.add_child("one-shot", Box::new(|| Ok(())));
        assert!(wait_until(2_000, || supervisor.child_count() == 0));
    }

    #[test]
    fn test_failing_child_restarts_then_gives_up() {
        let supervisor = Supervisor::new("test");
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        supervisor.add_child(
            "flaky",
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ChainError::Network("refused".to_string()))
            }),
        );

        // First run plus MAX_RESTARTS retries.
        assert!(wait_until(5_000, || {
            attempts.load(Ordering::SeqCst) == MAX_RESTARTS + 1
        }));
        assert!(wait_until(2_000, || supervisor.child_count() == 0));
    }

    #[test]
    fn test_child_succeeding_after_retry() {
        let supervisor = Supervisor::new("test");
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        supervisor.add_child(
            "recovers",
            Box::new(move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ChainError::Network("first try fails".to_string()))
                } else {
                    Ok(())
                }
            }),
        );
        assert!(wait_until(5_000, || attempts.load(Ordering::SeqCst) == 2));
        assert!(wait_until(2_000, || supervisor.child_count() == 0));
    }

    #[test]
    fn test_shutdown_stops_restarts() {
        let supervisor = Supervisor::new("test");
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        supervisor.shutdown();
        supervisor.add_child(
            "stopped",
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ChainError::Network("never retried".to_string()))
            }),
        );
        thread::sleep(Duration::from_millis(300));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
        assert!(supervisor.is_shutdown());
    }
}
