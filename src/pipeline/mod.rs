//! Pipeline stages for turning a raw photo into an upload-ready page.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ heic ──▶ encode ──▶ (upload) ──▶ … OCR … ──▶ postprocess
//! (sniff)  (convert) (scale/jpeg)                       (text cleanup)
//! ```
//!
//! 1. [`input`]  — classify bytes by declared type, extension, or magic;
//!    reject what is not an image
//! 2. [`heic`]   — convert HEIC/HEIF to JPEG through an external tool
//! 3. [`encode`] — downscale, optional luma, quality-ladder JPEG encode;
//!    runs in `spawn_blocking` because it is CPU-bound
//! 4. [`postprocess`] — deterministic cleanup of vision-model OCR output before
//!    it is handed back to the queue

pub mod encode;
pub mod heic;
pub mod input;
pub mod postprocess;
