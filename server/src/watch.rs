//! File-system watcher: debounces changes under the source root and
//! re-runs the full ingestion pipeline, swapping the server's snapshot in
//! place once it completes.
//!
//! Grounded on the concurrency model's "suspension points" (notify-driven,
//! debounced, off the request path) rather than on any one upstream file —
//! the Python implementation has no live-watch path of its own, relying
//! instead on an explicit `/update` call.

use crate::state::AppState;
use codescope_core::progress::NullProgress;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

const DEBOUNCE_MS: u64 = 500;

/// Start the watcher thread and return the `notify` handle; the caller must
/// keep it alive for the watch to stay active.
pub fn spawn(state: Arc<AppState>) -> RecommendedWatcher {
    let (tx, rx) = channel();
    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .expect("failed to build filesystem watcher");

    let root = state.config.snapshot().root.clone();
    if let Err(e) = watcher.watch(&root, RecursiveMode::Recursive) {
        tracing::warn!(error = %e, root = %root.display(), "file watcher disabled: failed to watch source root");
    }

    std::thread::spawn(move || {
        loop {
            let Ok(first) = rx.recv() else { break };
            let mut saw_change = first.is_ok();
            while let Ok(next) = rx.recv_timeout(Duration::from_millis(DEBOUNCE_MS)) {
                saw_change = saw_change || next.is_ok();
            }
            if !saw_change {
                continue;
            }

            tracing::info!("source tree changed, re-ingesting");
            let config = state.config.snapshot();
            let cancel = Arc::new(AtomicBool::new(false));
            match codescope_core::ingest::run(&config, &state.binary_exts, &NullProgress, &cancel) {
                Ok(result) => state.replace_snapshot(result),
                Err(e) => tracing::warn!(error = %e, "re-ingestion after file change failed"),
            }
        }
    });

    watcher
}
