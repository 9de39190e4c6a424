//! Helpers for testing pull caches.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - A [`Gate`] blocks whoever waits on it until it is opened. Use it to hold a computation in
//!    flight while the test issues more requests, and keep a clone around to open it later.
//!
//!  - A [`ConcurrencyProbe`] only observes overlap if the probed section actually yields to the
//!    runtime. Combine it with a sleep or a [`Gate`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `pullcache_service` crate and mutes
///    all other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("pullcache_service=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Counts how many callers are inside a section at the same time.
///
/// Clones share their counters.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    inner: Arc<ProbeCounters>,
}

#[derive(Debug, Default)]
struct ProbeCounters {
    active: AtomicUsize,
    max_active: AtomicUsize,
    entered: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters the section until the returned guard is dropped.
    pub fn enter(&self) -> ProbeGuard {
        let counters = &self.inner;
        counters.entered.fetch_add(1, Ordering::SeqCst);
        let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_active.fetch_max(active, Ordering::SeqCst);
        ProbeGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// The highest number of callers that were inside at once.
    pub fn max_active(&self) -> usize {
        self.inner.max_active.load(Ordering::SeqCst)
    }

    /// The number of callers that are inside right now.
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// The number of times the section was entered.
    pub fn total(&self) -> usize {
        self.inner.entered.load(Ordering::SeqCst)
    }
}

/// Leaves the section of a [`ConcurrencyProbe`] on drop.
#[derive(Debug)]
pub struct ProbeGuard {
    inner: Arc<ProbeCounters>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A gate that stays closed until [`Gate::open`] is called.
///
/// Clones share the same gate. Once opened it stays open.
#[derive(Debug, Clone)]
pub struct Gate {
    open: Arc<watch::Sender<bool>>,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    pub fn new() -> Self {
        let (open, _) = watch::channel(false);
        Self {
            open: Arc::new(open),
        }
    }

    /// Opens the gate, releasing all current and future waiters.
    pub fn open(&self) {
        self.open.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Waits until the gate is opened.
    pub async fn wait(&self) {
        let mut receiver = self.open.subscribe();
        receiver.wait_for(|open| *open).await.ok();
    }
}
