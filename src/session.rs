//! Capture session: acquisition → normalisation → upload → staging.
//!
//! A [`CaptureSession`] owns the staging queue and everything needed to put
//! pages into it. Files are processed strictly one at a time; a file that
//! fails (bad format, failed HEIC conversion, upload error) is reported and
//! skipped, and the rest of the batch still gets staged.

use crate::backend::{OcrService, Uploader};
use crate::camera::{Camera, FrameSource};
use crate::config::{CaptureConfig, NormalizationOptions};
use crate::error::{CaptureError, ItemError, OcrError};
use crate::pipeline::encode::decode_and_compress;
use crate::pipeline::heic::{CommandHeicConverter, HeicConverter};
use crate::pipeline::input::{normalize_format, read_file, RawImage};
use crate::progress::ProgressCallback;
use crate::queue::{Capture, PreviewHandle, StagedImage, StagingQueue};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of [`CaptureSession::stage_files`].
#[derive(Debug, Default)]
pub struct StageReport {
    /// Number of files appended to the queue.
    pub staged: usize,
    /// Files that were skipped, in input order.
    pub errors: Vec<ItemError>,
}

/// Drives pages from raw bytes into the staging queue and out through OCR.
pub struct CaptureSession {
    options: NormalizationOptions,
    converter: Arc<dyn HeicConverter>,
    uploader: Arc<dyn Uploader>,
    progress: Option<ProgressCallback>,
    queue: StagingQueue,
}

impl CaptureSession {
    pub fn new(config: &CaptureConfig, uploader: Arc<dyn Uploader>) -> Self {
        Self {
            options: config.normalization,
            converter: Arc::new(CommandHeicConverter::new(config.heic_converter.as_str())),
            uploader,
            progress: None,
            queue: StagingQueue::new(),
        }
    }

    /// Replace the HEIC converter.
    pub fn with_converter(mut self, converter: Arc<dyn HeicConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Receive progress events.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn queue(&self) -> &StagingQueue {
        &self.queue
    }

    /// Mutable access for reordering and removal.
    pub fn queue_mut(&mut self) -> &mut StagingQueue {
        &mut self.queue
    }

    /// Normalise, upload, and append a single image.
    pub async fn stage_image(&mut self, raw: RawImage) -> Result<&StagedImage, ItemError> {
        let name = raw.name.clone();
        let raster = normalize_format(raw, self.converter.as_ref()).await?;
        let encoded = decode_and_compress(raster.name, raster.bytes, self.options).await?;
        if !encoded.fits_ceiling {
            warn!(
                "'{}': {} bytes at lowest quality exceeds the {} byte ceiling; uploading anyway",
                name,
                encoded.bytes.len(),
                self.options.max_upload_bytes
            );
        }

        let preview =
            PreviewHandle::create(&encoded.bytes).map_err(|e| ItemError::PreviewFailed {
                name: name.clone(),
                detail: e.to_string(),
            })?;

        let upload_name = upload_file_name(&name);
        let byte_len = encoded.bytes.len();
        let receipt = self
            .uploader
            .upload(encoded.bytes, &upload_name, "image/jpeg")
            .await
            .map_err(|source| ItemError::Upload {
                name: name.clone(),
                source,
            })?;

        self.queue.append(StagedImage {
            preview,
            remote_id: receipt.remote_id,
            url: receipt.url,
            file_name: upload_name,
            byte_len,
            width: encoded.width,
            height: encoded.height,
        });
        let last = self.queue.len() - 1;
        Ok(&self.queue.items()[last])
    }

    /// Stage every file in order, one at a time.
    ///
    /// Failures are reported and skipped; they never stop the batch.
    pub async fn stage_files(&mut self, paths: &[PathBuf]) -> StageReport {
        let total = paths.len();
        let mut report = StageReport::default();
        if let Some(ref cb) = self.progress {
            cb.on_batch_start(total);
        }

        for (index, path) in paths.iter().enumerate() {
            let name = display_name(path);
            if let Some(ref cb) = self.progress {
                cb.on_item_start(index, total, &name);
            }

            let result = match read_file(path).await {
                Ok(raw) => self.stage_image(raw).await.map(|item| item.byte_len),
                Err(e) => Err(e),
            };

            match result {
                Ok(bytes) => {
                    report.staged += 1;
                    if let Some(ref cb) = self.progress {
                        cb.on_item_staged(index, total, &name, bytes);
                    }
                }
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    if let Some(ref cb) = self.progress {
                        cb.on_item_error(index, total, &name, &e.to_string());
                    }
                    report.errors.push(e);
                }
            }
        }

        info!("Staged {}/{} files", report.staged, total);
        if let Some(ref cb) = self.progress {
            cb.on_batch_complete(total, report.staged);
        }
        report
    }

    /// Grab one frame from `camera` and stage it.
    ///
    /// The camera is acquired if idle and released after a successful
    /// capture. On failure it stays streaming so the user can try again.
    pub async fn capture_frame<S: FrameSource>(
        &mut self,
        camera: &mut Camera<S>,
    ) -> Result<&StagedImage, CaptureError> {
        if !camera.is_active() {
            camera.acquire().await?;
        }
        let frame = camera.grab_frame().await?;
        let name = frame.name.clone();
        let bytes = match self.stage_image(frame).await {
            Ok(item) => item.byte_len,
            Err(e) => {
                if let Some(ref cb) = self.progress {
                    cb.on_item_error(0, 1, &name, &e.to_string());
                }
                return Err(e.into());
            }
        };
        camera.release().await;
        if let Some(ref cb) = self.progress {
            cb.on_item_staged(0, 1, &name, bytes);
        }
        let last = self.queue.len() - 1;
        Ok(&self.queue.items()[last])
    }

    /// Finalize the queue; see [`StagingQueue::finalize`].
    pub async fn finalize(&mut self, ocr: &dyn OcrService) -> Result<Option<Capture>, OcrError> {
        let pages = self.queue.len();
        if pages > 0 {
            if let Some(ref cb) = self.progress {
                cb.on_finalize_start(pages);
            }
        }

        match self.queue.finalize(ocr).await {
            Ok(Some(capture)) => {
                if let Some(ref cb) = self.progress {
                    cb.on_finalize_complete(pages, capture.text.len());
                }
                Ok(Some(capture))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!("Finalize failed, {} pages kept: {}", pages, e);
                if let Some(ref cb) = self.progress {
                    cb.on_finalize_error(pages, &e.to_string());
                }
                Err(e)
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Every staged page is re-encoded as JPEG, so the upload name says so.
fn upload_file_name(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("capture");
    format!("{stem}.jpg")
}
