//! # journal-capture
//!
//! Capture handwritten journal pages and turn them into text.
//!
//! ## Why this crate?
//!
//! Phone photos of journal pages are large, come in mixed formats (JPEG,
//! PNG, HEIC), and must be read back in the order the pages were written.
//! This crate normalises each photo into a size-capped JPEG, uploads it,
//! keeps the uploads in a reorderable staging queue, and finalizes the queue
//! as a single OCR batch whose results are stitched back together in page
//! order.
//!
//! ## Pipeline Overview
//!
//! ```text
//! photo / camera frame
//!  │
//!  ├─ 1. Input     classify by type, extension, or magic; reject non-images
//!  ├─ 2. HEIC      convert through heif-convert (or any configured tool)
//!  ├─ 3. Encode    downscale, optional luma, JPEG quality ladder ≤ 9.5 MiB
//!  ├─ 4. Upload    journal web app, or a local media store
//!  ├─ 5. Stage     append; reorder / remove freely
//!  └─ 6. Finalize  one OCR call for all pages → "--- Page N ---" text
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use journal_capture::{backend, CaptureConfig, CaptureSession};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CaptureConfig::builder()
//!         .backend_url("http://localhost:3000")
//!         .grayscale(true)
//!         .build()?;
//!     let backends = backend::connect(&config)?;
//!
//!     let mut session = CaptureSession::new(&config, backends.uploader.clone());
//!     let report = session
//!         .stage_files(&[PathBuf::from("page1.heic"), PathBuf::from("page2.jpg")])
//!         .await;
//!     eprintln!("staged {}, skipped {}", report.staged, report.errors.len());
//!
//!     if let Some(capture) = session.finalize(backends.ocr.as_ref()).await? {
//!         println!("{}", capture.text);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `journal-capture` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod camera;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod queue;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{OcrResults, OcrService, UploadReceipt, Uploader};
pub use camera::{Camera, CommandFrameSource, FrameSource};
pub use config::{CaptureConfig, CaptureConfigBuilder, NormalizationOptions};
pub use error::{CameraError, CaptureError, ItemError, OcrError, UploadError};
pub use output::write_text_atomic;
pub use pipeline::encode::{compress, EncodedImage};
pub use progress::{NoopProgressCallback, ProgressCallback, StagingProgressCallback};
pub use queue::{Capture, Direction, PreviewHandle, StagedImage, StagingQueue};
pub use session::{CaptureSession, StageReport};
