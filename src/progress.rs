//! Progress-callback trait for conversion flow events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::orchestrator::ConversionOrchestrator::with_progress`] to observe
//! single-file state transitions and per-file bulk progress.
//!
//! Callers forward events wherever their UI lives: a terminal progress bar,
//! a status line, a test recorder. The library knows nothing about how the
//! host displays them.
//!
//! # Example
//!
//! ```rust
//! use tabularis::ConversionProgressCallback;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     failed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_file_error(&self, index: usize, total: usize, file_name: &str, error: &str) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {} failed: {}", index, total, file_name, error);
//!     }
//! }
//!
//! let cb: Arc<dyn ConversionProgressCallback> = Arc::new(CountingCallback {
//!     failed: AtomicUsize::new(0),
//! });
//! cb.on_file_error(2, 3, "b.pdf", "Server error");
//! ```

use crate::orchestrator::FlowStep;
use crate::output::SavedArtifact;
use crate::quota::QuotaGate;
use std::sync::Arc;

/// Called by the orchestrator as a flow or bulk run advances.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Bulk files are processed strictly one at a time, so
/// per-file events never overlap.
pub trait ConversionProgressCallback: Send + Sync {
    /// A single-file flow entered `step`.
    ///
    /// # Arguments
    /// * `file_name` — the file the flow is working on (empty when idle)
    /// * `step`      — the state just entered
    fn on_step(&self, file_name: &str, step: FlowStep) {
        let _ = (file_name, step);
    }

    /// Called once before the first file of a bulk run.
    fn on_run_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called just before a bulk file is uploaded.
    ///
    /// # Arguments
    /// * `index`     — 1-indexed position in the run
    /// * `total`     — files in the run
    /// * `file_name` — source PDF name
    fn on_file_start(&self, index: usize, total: usize, file_name: &str) {
        let _ = (index, total, file_name);
    }

    /// Called when a bulk file was converted and saved.
    fn on_file_complete(&self, index: usize, total: usize, artifact: &SavedArtifact) {
        let _ = (index, total, artifact);
    }

    /// Called when a bulk file failed. The run continues with the next file.
    ///
    /// # Arguments
    /// * `error` — human-readable error description
    fn on_file_error(&self, index: usize, total: usize, file_name: &str, error: &str) {
        let _ = (index, total, file_name, error);
    }

    /// Called once after every bulk file has been attempted.
    fn on_run_complete(&self, total: usize, succeeded: usize) {
        let _ = (total, succeeded);
    }

    /// Called after usage was re-read from the service.
    fn on_quota_refreshed(&self, quota: &QuotaGate) {
        let _ = quota;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored by the orchestrator.
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

/// Status line shown while bulk file `index` of `total` converts.
pub fn file_progress_message(index: usize, total: usize, file_name: &str) -> String {
    format!("Converting {index}/{total}: {file_name}")
}

/// Final bulk tally.
pub fn run_summary_message(succeeded: usize, total: usize) -> String {
    format!("Done: {succeeded}/{total}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        run_total: AtomicUsize,
        succeeded: AtomicUsize,
        steps: Mutex<Vec<FlowStep>>,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_step(&self, _file_name: &str, step: FlowStep) {
            self.steps.lock().unwrap().push(step);
        }

        fn on_run_start(&self, total_files: usize) {
            self.run_total.store(total_files, Ordering::SeqCst);
        }

        fn on_file_start(&self, _index: usize, _total: usize, _file_name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _index: usize, _total: usize, _artifact: &SavedArtifact) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _index: usize, _total: usize, _file_name: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_complete(&self, _total: usize, succeeded: usize) {
            self.succeeded.store(succeeded, Ordering::SeqCst);
        }
    }

    fn saved(name: &str) -> SavedArtifact {
        SavedArtifact {
            filename: name.into(),
            location: None,
            size_bytes: 0,
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_step("a.pdf", FlowStep::Inspecting);
        cb.on_run_start(3);
        cb.on_file_start(1, 3, "a.pdf");
        cb.on_file_complete(1, 3, &saved("a.xlsx"));
        cb.on_file_error(2, 3, "b.pdf", "some error");
        cb.on_run_complete(3, 2);
        cb.on_quota_refreshed(&QuotaGate::unlimited());
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_run_start(3);
        assert_eq!(tracker.run_total.load(Ordering::SeqCst), 3);

        tracker.on_file_start(1, 3, "a.pdf");
        tracker.on_file_complete(1, 3, &saved("a.xlsx"));
        tracker.on_file_start(2, 3, "b.pdf");
        tracker.on_file_error(2, 3, "b.pdf", "Server error");
        tracker.on_file_start(3, 3, "c.pdf");
        tracker.on_file_complete(3, 3, &saved("c.xlsx"));

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);

        tracker.on_run_complete(3, 2);
        assert_eq!(tracker.succeeded.load(Ordering::SeqCst), 2);

        tracker.on_step("a.pdf", FlowStep::Converting);
        assert_eq!(*tracker.steps.lock().unwrap(), vec![FlowStep::Converting]);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(10);
        cb.on_file_start(1, 10, "a.pdf");
    }

    #[test]
    fn messages() {
        assert_eq!(file_progress_message(2, 5, "q3.pdf"), "Converting 2/5: q3.pdf");
        assert_eq!(run_summary_message(2, 3), "Done: 2/3");
    }
}
