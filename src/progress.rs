//! Progress-callback trait for per-PDF run events.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::config::CropConfigBuilder::progress_callback`] to receive events
//! as the driver walks the exam tree. The CLI forwards them to a terminal
//! progress bar; a library caller might forward them to a channel instead.
//!
//! # Example
//!
//! ```rust
//! use examcrop::{CropConfig, RunProgressCallback};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     images: AtomicUsize,
//! }
//!
//! impl RunProgressCallback for CountingCallback {
//!     fn on_pdf_complete(&self, _pdf: &Path, produced: usize, _missing: usize) {
//!         self.images.fetch_add(produced, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { images: AtomicUsize::new(0) });
//!
//! let config = CropConfig::builder()
//!     .progress_callback(counter as Arc<dyn RunProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the driver as it processes each PDF.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` PDFs run on
/// separate blocking threads and events arrive from any of them. All methods
/// have default no-op implementations.
pub trait RunProgressCallback: Send + Sync {
    /// Called once before the first PDF is opened.
    ///
    /// # Arguments
    /// * `total_pdfs`: number of PDFs discovered for this run
    fn on_run_start(&self, total_pdfs: usize) {
        let _ = total_pdfs;
    }

    /// Called just before a PDF is opened.
    fn on_pdf_start(&self, pdf: &Path) {
        let _ = pdf;
    }

    /// Called when a PDF has been fully scanned.
    ///
    /// # Arguments
    /// * `pdf`     : path of the processed PDF
    /// * `produced`: question images present after this PDF (new or cached)
    /// * `missing` : expected question numbers that were never produced
    fn on_pdf_complete(&self, pdf: &Path, produced: usize, missing: usize) {
        let _ = (pdf, produced, missing);
    }

    /// Called when a PDF is skipped because of a fatal error.
    fn on_pdf_error(&self, pdf: &Path, error: &str) {
        let _ = (pdf, error);
    }

    /// Called once after every PDF has been attempted.
    ///
    /// # Arguments
    /// * `total_pdfs`: PDFs attempted
    /// * `ok_pdfs`   : PDFs that were processed without a fatal error
    fn on_run_complete(&self, total_pdfs: usize, ok_pdfs: usize) {
        let _ = (total_pdfs, ok_pdfs);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RunProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::CropConfig`].
pub type ProgressCallback = Arc<dyn RunProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        started_total: AtomicUsize,
        starts: AtomicUsize,
        produced: AtomicUsize,
        errors: AtomicUsize,
        ok_total: AtomicUsize,
    }

    impl RunProgressCallback for TrackingCallback {
        fn on_run_start(&self, total_pdfs: usize) {
            self.started_total.store(total_pdfs, Ordering::SeqCst);
        }

        fn on_pdf_start(&self, _pdf: &Path) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_pdf_complete(&self, _pdf: &Path, produced: usize, _missing: usize) {
            self.produced.fetch_add(produced, Ordering::SeqCst);
        }

        fn on_pdf_error(&self, _pdf: &Path, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_complete(&self, _total_pdfs: usize, ok_pdfs: usize) {
            self.ok_total.store(ok_pdfs, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(2);
        cb.on_pdf_start(Path::new("a.pdf"));
        cb.on_pdf_complete(Path::new("a.pdf"), 40, 0);
        cb.on_pdf_error(Path::new("b.pdf"), "no configuration");
        cb.on_run_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_run_start(3);
        tracker.on_pdf_start(Path::new("1.pdf"));
        tracker.on_pdf_complete(Path::new("1.pdf"), 40, 0);
        tracker.on_pdf_start(Path::new("2.pdf"));
        tracker.on_pdf_complete(Path::new("2.pdf"), 38, 2);
        tracker.on_pdf_start(Path::new("3.pdf"));
        tracker.on_pdf_error(Path::new("3.pdf"), "corrupt");
        tracker.on_run_complete(3, 2);

        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.produced.load(Ordering::SeqCst), 78);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.ok_total.load(Ordering::SeqCst), 2);
    }
}
