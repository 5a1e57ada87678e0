//! Progress reporting abstraction shared by ingestion passes.
//!
//! Ingestion runs as a CLI command and as a long HTTP request backing an SSE
//! stream; both drive the same passes, so the passes report through a trait
//! rather than assuming a channel or a writer.

use std::sync::atomic::{AtomicUsize, Ordering};

pub trait ProgressSink: Send + Sync {
    /// `step` names the pass ("folder_tree", "code_analysis", "shard_extraction", ...);
    /// `percentage` is 0-100 and need not be monotonic across steps.
    fn report(&self, step: &str, percentage: u8);
}

/// Default sink for contexts that don't expose progress (library callers, tests).
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _step: &str, _percentage: u8) {}
}

/// Emits a report every `interval` completed items rather than on every one,
/// matching the upstream shard extractor's "every 5 files" cadence.
pub struct Cadence {
    interval: usize,
    done: AtomicUsize,
    total: usize,
}

impl Cadence {
    pub fn new(total: usize, interval: usize) -> Self {
        Cadence { interval: interval.max(1), done: AtomicUsize::new(0), total }
    }

    /// Call once per completed item. Returns `Some(percentage)` when this call
    /// lands on a reporting boundary (or is the final item).
    pub fn tick(&self) -> Option<u8> {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        if done % self.interval == 0 || done == self.total {
            let pct = if self.total == 0 { 100 } else { ((done * 100) / self.total).min(100) as u8 };
            Some(pct)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_on_interval_and_on_completion() {
        let c = Cadence::new(12, 5);
        let reports: Vec<Option<u8>> = (0..12).map(|_| c.tick()).collect();
        assert!(reports[4].is_some());
        assert!(reports[9].is_some());
        assert!(reports[11].is_some());
        assert!(reports[0].is_none());
    }
}
