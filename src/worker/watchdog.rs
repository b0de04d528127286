//! Unload watchdog
//!
//! Sessions being unloaded are kept in an [`UnloadRegistry`] until their
//! worker has exited. A single [`Watchdog`] thread sweeps the registry at a
//! fixed interval: finished entries are removed, and entries that have been
//! unloading for longer than the budget get their worker terminated.
//!
//! Active sessions are never subject to the budget; a slow handler may keep
//! negotiating or rendering for as long as it is current.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::WatchdogSettings;
use crate::preview::SessionId;

/// A session as seen by the watchdog
pub trait UnloadEntry: Send + Sync {
    fn id(&self) -> SessionId;

    /// When unloading started, if it has
    fn unload_started(&self) -> Option<Instant>;

    /// Whether the session's worker thread has exited
    fn worker_finished(&self) -> bool;

    /// Wait up to `timeout` for the worker to exit
    fn wait_finished(&self, timeout: Duration) -> bool;

    /// Abandon the session's worker
    fn terminate(&self);
}

/// Sessions currently unloading
#[derive(Default)]
pub struct UnloadRegistry {
    entries: Mutex<BTreeMap<SessionId, Arc<dyn UnloadEntry>>>,
}

impl UnloadRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: Arc<dyn UnloadEntry>) {
        self.entries.lock().insert(entry.id(), entry);
    }

    pub fn remove(&self, id: SessionId) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Current entries, in session order
    #[must_use]
    pub fn entries(&self) -> Vec<Arc<dyn UnloadEntry>> {
        self.entries.lock().values().cloned().collect()
    }
}

/// Outcome of one sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries whose worker had exited
    pub finished: Vec<SessionId>,
    /// Entries whose worker was abandoned
    pub terminated: Vec<SessionId>,
}

/// Remove finished entries and terminate those over `budget`
pub fn sweep(registry: &UnloadRegistry, now: Instant, budget: Duration) -> SweepReport {
    let mut report = SweepReport::default();
    for entry in registry.entries() {
        let id = entry.id();
        if entry.worker_finished() {
            registry.remove(id);
            report.finished.push(id);
            continue;
        }
        let overdue = entry
            .unload_started()
            .is_some_and(|started| now.saturating_duration_since(started) > budget);
        if overdue {
            warn!(session = %id, ?budget, "unload timed out, abandoning worker");
            entry.terminate();
            registry.remove(id);
            report.terminated.push(id);
        }
    }
    if !report.finished.is_empty() {
        debug!(count = report.finished.len(), "removed unloaded sessions");
    }
    report
}

/// Background thread sweeping an [`UnloadRegistry`]
pub struct Watchdog {
    stop: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Watchdog {
    /// Start sweeping `registry`
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if the thread cannot be spawned.
    pub fn start(registry: Arc<UnloadRegistry>, settings: WatchdogSettings) -> io::Result<Self> {
        let (stop, stopped) = bounded(1);
        let handle = thread::Builder::new()
            .name("peekr-watchdog".to_string())
            .spawn(move || watch(&registry, settings, &stopped))?;

        Ok(Self {
            stop: Mutex::new(Some(stop)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Ask the watchdog to exit once the registry is empty
    pub fn stop(&self) {
        self.stop.lock().take();
    }

    /// Wait for the watchdog thread to exit
    pub fn join(&self) {
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch(registry: &UnloadRegistry, settings: WatchdogSettings, stopped: &Receiver<()>) {
    let interval = settings.sweep_interval();
    let budget = settings.unload_timeout();
    let mut stopping = false;

    loop {
        if stopping {
            if registry.is_empty() {
                break;
            }
            thread::sleep(interval);
        } else {
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => stopping = true,
            }
        }
        sweep(registry, Instant::now(), budget);
    }
    debug!("watchdog exited");
}
