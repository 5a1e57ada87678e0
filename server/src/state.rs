//! Shared server state: one read-mostly snapshot of the last completed
//! ingestion pass, swapped atomically by `/update` and the file watcher.
//!
//! Mirrors the `Arc<RwLock<ServerState>>` pattern this workspace already
//! uses for request-visible state, but holds an immutable `Arc<IngestResult>`
//! behind the lock rather than mutable fields, so readers never block on a
//! writer mid-ingestion.

use codescope_core::config::BinaryExtensionSet;
use codescope_core::ingest::IngestResult;
use codescope_core::SharedConfig;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::agent::AgentModel;

pub struct AppState {
    pub config: SharedConfig,
    pub binary_exts: Arc<BinaryExtensionSet>,
    pub model: Arc<dyn AgentModel>,
    snapshot: RwLock<Arc<IngestResult>>,
    start_time: Instant,
    init_completed: AtomicBool,
    request_counter: AtomicU64,
}

impl AppState {
    pub fn new(
        config: SharedConfig,
        binary_exts: BinaryExtensionSet,
        initial: IngestResult,
        model: Arc<dyn AgentModel>,
    ) -> Self {
        AppState {
            config,
            binary_exts: Arc::new(binary_exts),
            model,
            snapshot: RwLock::new(Arc::new(initial)),
            start_time: Instant::now(),
            init_completed: AtomicBool::new(true),
            request_counter: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<IngestResult> {
        self.snapshot.read().expect("snapshot lock poisoned").clone()
    }

    pub fn replace_snapshot(&self, next: IngestResult) {
        let mut guard = self.snapshot.write().expect("snapshot lock poisoned");
        *guard = Arc::new(next);
    }

    pub fn mark_init_completed(&self) {
        self.init_completed.store(true, Ordering::SeqCst);
    }

    pub fn is_init_completed(&self) -> bool {
        self.init_completed.load(Ordering::SeqCst)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Monotonic counter for request-log ids, a stand-in for the upstream's
    /// timestamp-based `req_<datetime>` ids that needs no wall-clock source.
    pub fn next_request_id(&self) -> u64 {
        self.request_counter.fetch_add(1, Ordering::SeqCst)
    }
}
