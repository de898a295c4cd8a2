//! Shared application state, constructed once in `main` and injected into
//! every handler — the REDESIGN FLAGS note's replacement for module-level
//! "get or create" singletons around the metrics collector, alert manager,
//! and job tracker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pipeline_core::alerts::AlertManager;
use pipeline_core::clock::Clock;
use pipeline_core::config::PipelineConfig;
use pipeline_core::controller::Controller;
use pipeline_core::jobs::JobTracker;
use pipeline_core::metrics::MetricsCollector;
use pipeline_core::resilience::{ResilientDatastoreClient, ResilientLlmClient};
use pipeline_core::validation::ValidationConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PipelineConfig>,
    pub validation: Arc<ValidationConfig>,
    pub controller: Arc<Controller>,
    pub jobs: Arc<JobTracker>,
    pub metrics: Arc<MetricsCollector>,
    pub alerts: Arc<AlertManager>,
    pub llm: Arc<ResilientLlmClient>,
    pub datastore: Arc<ResilientDatastoreClient>,
    pub clock: Arc<dyn Clock>,
    /// Flipped once startup completes; `/health/detailed`'s controller
    /// readiness check reads it (SPEC_FULL.md §3).
    pub ready: Arc<AtomicBool>,
}

impl AppState {
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
