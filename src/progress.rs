//! Progress-callback trait for staging and finalize events.
//!
//! Inject an [`Arc<dyn StagingProgressCallback>`] via
//! [`crate::session::CaptureSession::with_progress`] to receive events as
//! files are normalised and uploaded, and when a batch is finalized. This is
//! also where per-file failures surface: a failed file is reported through
//! [`StagingProgressCallback::on_item_error`] and the batch moves on.
//!
//! # Example
//!
//! ```rust
//! use journal_capture::StagingProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     staged: AtomicUsize,
//! }
//!
//! impl StagingProgressCallback for CountingCallback {
//!     fn on_item_staged(&self, index: usize, total: usize, name: &str, bytes: usize) {
//!         self.staged.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {name}: {bytes} bytes", index + 1, total);
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by a [`crate::session::CaptureSession`] as it works.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Indices are 0-based positions within the batch.
pub trait StagingProgressCallback: Send + Sync {
    /// Called once before the first file of a batch is read.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called before an item is normalised.
    fn on_item_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when an item has been uploaded and appended to the queue.
    ///
    /// `bytes` is the size of the uploaded JPEG.
    fn on_item_staged(&self, index: usize, total: usize, name: &str, bytes: usize) {
        let _ = (index, total, name, bytes);
    }

    /// Called when an item is skipped. The batch continues.
    fn on_item_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let _ = (index, total, name, error);
    }

    /// Called once after every file of a batch has been attempted.
    fn on_batch_complete(&self, total: usize, staged: usize) {
        let _ = (total, staged);
    }

    /// Called before the OCR request of a finalize is sent.
    fn on_finalize_start(&self, pages: usize) {
        let _ = pages;
    }

    /// Called after a finalize succeeded and the queue was cleared.
    fn on_finalize_complete(&self, pages: usize, text_len: usize) {
        let _ = (pages, text_len);
    }

    /// Called when a finalize failed. The queue is untouched.
    fn on_finalize_error(&self, pages: usize, error: &str) {
        let _ = (pages, error);
    }
}

/// A no-op implementation, the default when no callback is configured.
pub struct NoopProgressCallback;

impl StagingProgressCallback for NoopProgressCallback {}

/// Convenience alias for the shared callback type.
pub type ProgressCallback = Arc<dyn StagingProgressCallback>;
