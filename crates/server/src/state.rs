//! Application state shared across handlers.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tally_core::config::AppConfig;
use tally_store::DocumentStore;
use tally_sync::{ChildEventHandler, CounterReconciler, JobKind};

/// Tracks running jobs so that each kind runs at most once at a time.
#[derive(Clone, Default)]
pub struct JobRegistry {
    running: Arc<Mutex<HashSet<JobKind>>>,
}

impl JobRegistry {
    /// Claim `kind`, or `None` if a run of that kind is in progress.
    ///
    /// The claim is released when the returned guard is dropped.
    pub fn try_acquire(&self, kind: JobKind) -> Option<JobGuard> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if !running.insert(kind) {
            return None;
        }
        crate::metrics::JOBS_ACTIVE.inc();
        Some(JobGuard {
            registry: self.clone(),
            kind,
        })
    }

    pub fn is_running(&self, kind: JobKind) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&kind)
    }
}

/// Exclusive claim on a job kind.
pub struct JobGuard {
    registry: JobRegistry,
    kind: JobKind,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.registry
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.kind);
        crate::metrics::JOBS_ACTIVE.dec();
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Document store backend.
    pub store: Arc<dyn DocumentStore>,
    /// Handler for child lifecycle events.
    pub reconciler: Arc<dyn ChildEventHandler>,
    /// Running bulk jobs.
    pub jobs: JobRegistry,
}

impl AppState {
    /// Create a new application state.
    ///
    /// The configuration is expected to have passed `AppConfig::validate`.
    pub fn new(config: AppConfig, store: Arc<dyn DocumentStore>) -> Self {
        let reconciler = Arc::new(CounterReconciler::new(
            store.clone(),
            config.counters.clone(),
        ));

        Self {
            config: Arc::new(config),
            store,
            reconciler,
            jobs: JobRegistry::default(),
        }
    }
}
