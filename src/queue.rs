//! The staging queue: uploaded pages waiting to be OCR'd as one batch.
//!
//! The queue's order is the page order. Everything in it has already been
//! uploaded, so reordering and removal are purely local. [`StagingQueue::finalize`]
//! snapshots the order, asks the OCR collaborator for all pages at once,
//! re-sorts the answers to the snapshot, and only then clears the queue.
//! If OCR fails nothing is lost; the user can simply finalize again.
//!
//! `finalize` borrows the queue mutably for its whole duration, so the queue
//! cannot be cleared or reordered while an OCR call is in flight.

use crate::backend::{OcrResults, OcrService};
use crate::error::OcrError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tempfile::TempPath;
use tracing::{debug, info, warn};

/// Local display copy of a staged page.
///
/// Backed by a temporary file that is deleted on [`PreviewHandle::release`]
/// or, failing that, on drop.
#[derive(Debug)]
pub struct PreviewHandle {
    path: TempPath,
}

impl PreviewHandle {
    /// Write `bytes` to a fresh temporary `.jpg` file.
    pub fn create(bytes: &[u8]) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("journal-preview-")
            .suffix(".jpg")
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the preview file now.
    pub fn release(self) {
        let shown = self.path.display().to_string();
        if let Err(e) = self.path.close() {
            warn!("Failed to release preview {}: {}", shown, e);
        }
    }
}

/// An uploaded page in the staging queue.
#[derive(Debug)]
pub struct StagedImage {
    pub preview: PreviewHandle,
    pub remote_id: String,
    pub url: String,
    pub file_name: String,
    /// Size of the uploaded JPEG.
    pub byte_len: usize,
    pub width: u32,
    pub height: u32,
}

/// Direction for [`StagingQueue::move_item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards the front (index − 1).
    Up,
    /// Towards the back (index + 1).
    Down,
}

/// The result of a successful finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capture {
    /// Remote ids in page order.
    pub remote_ids: Vec<String>,
    /// All pages joined with `--- Page N ---` headers.
    pub text: String,
}

/// Ordered list of uploaded-but-not-finalized pages.
#[derive(Debug, Default)]
pub struct StagingQueue {
    items: Vec<StagedImage>,
}

impl StagingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[StagedImage] {
        &self.items
    }

    pub fn remote_ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.remote_id.clone()).collect()
    }

    /// Add a page at the end.
    pub fn append(&mut self, item: StagedImage) {
        debug!("Staged page {}: {}", self.items.len() + 1, item.remote_id);
        self.items.push(item);
    }

    /// Swap the item at `index` with its neighbour in `direction`.
    ///
    /// Returns `false` and leaves the queue unchanged when either position is
    /// out of bounds.
    pub fn move_item(&mut self, index: usize, direction: Direction) -> bool {
        let target = match direction {
            Direction::Up => index.checked_sub(1),
            Direction::Down => index.checked_add(1),
        };
        match target {
            Some(t) if index < self.items.len() && t < self.items.len() => {
                self.items.swap(index, t);
                true
            }
            _ => false,
        }
    }

    /// Remove the item at `index`, releasing its preview.
    ///
    /// Returns `false` and leaves the queue unchanged when out of range.
    pub fn remove_item(&mut self, index: usize) -> bool {
        if index >= self.items.len() {
            return false;
        }
        let item = self.items.remove(index);
        debug!("Removed staged page {}: {}", index + 1, item.remote_id);
        item.preview.release();
        true
    }

    /// Release every preview and empty the queue.
    pub fn clear(&mut self) {
        for item in self.items.drain(..) {
            item.preview.release();
        }
    }

    /// OCR every staged page as one batch and assemble the text in queue order.
    ///
    /// * Empty queue → `Ok(None)` without calling `ocr`.
    /// * Success → the queue is cleared and the [`Capture`] returned.
    /// * Failure → the queue is left exactly as it was.
    pub async fn finalize(&mut self, ocr: &dyn OcrService) -> Result<Option<Capture>, OcrError> {
        if self.items.is_empty() {
            return Ok(None);
        }

        let remote_ids = self.remote_ids();
        info!("Finalizing {} staged pages", remote_ids.len());

        let results = ocr.extract_text(&remote_ids).await?;
        let text = assemble_pages(&remote_ids, &results);

        self.clear();
        Ok(Some(Capture { remote_ids, text }))
    }
}

/// Join OCR results in `order`, one `--- Page N ---` block per page.
///
/// Page text is only trimmed here; any further cleanup belongs to the OCR
/// collaborator. Ids missing from `results` contribute an empty page.
pub fn assemble_pages(order: &[String], results: &OcrResults) -> String {
    order
        .iter()
        .enumerate()
        .map(|(i, id)| {
            format!(
                "--- Page {} ---\n\n{}",
                i + 1,
                results.text_for(id).trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
