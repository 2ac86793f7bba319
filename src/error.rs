//! Error types for the journal-capture library.
//!
//! Errors are split by who can recover from them:
//!
//! * [`CaptureError`] — **Fatal** for the current operation: invalid
//!   configuration, a provider that cannot be built, an output file that
//!   cannot be written. Returned as `Err(CaptureError)` from top-level calls.
//!
//! * [`ItemError`] — **Non-fatal**: one image in a batch could not be
//!   normalised or uploaded. The session reports it and moves on to the next
//!   file, so one bad photo never costs the user the rest of the batch.
//!
//! * [`UploadError`] / [`OcrError`] — failures reported by the two remote
//!   collaborators. An OCR failure aborts a finalize and leaves the staging
//!   queue untouched so the user can retry.
//!
//! * [`CameraError`] — misuse of the camera capability (double acquire,
//!   grabbing while idle) or a device failure.
//!
//! Nothing here is retried automatically; every retry is a user action.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors returned by the journal-capture library.
#[derive(Debug, Error)]
pub enum CaptureError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The vision provider used for direct OCR is not initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Acquisition errors ────────────────────────────────────────────────
    /// Camera misuse or device failure.
    #[error(transparent)]
    Camera(#[from] CameraError),

    /// A single staged item failed and the caller asked for it to be fatal.
    #[error(transparent)]
    Item(#[from] ItemError),

    // ── Finalize errors ───────────────────────────────────────────────────
    /// OCR failed; the staging queue was left intact.
    #[error(transparent)]
    Ocr(#[from] OcrError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output text file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image.
///
/// Reported through [`crate::progress::StagingProgressCallback::on_item_error`]
/// and returned from [`crate::session::CaptureSession::stage_files`] so
/// callers can show which files were skipped.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// HEIC/HEIF input whose conversion to a standard raster failed.
    #[error("'{name}': HEIC conversion failed: {detail}")]
    FormatUnsupported { name: String, detail: String },

    /// Input is neither an image nor HEIC.
    #[error("'{name}': unsupported input type '{mime_type}'")]
    UnsupportedInput { name: String, mime_type: String },

    /// The input could not be read from disk.
    #[error("'{name}': cannot read file: {detail}")]
    ReadFailed { name: String, detail: String },

    /// Bytes claimed to be an image but could not be decoded.
    #[error("'{name}': cannot decode image: {detail}")]
    DecodeFailed { name: String, detail: String },

    /// No rendering surface could be produced (empty frame, zero-sized raster).
    #[error("'{name}': rendering surface unavailable: {detail}")]
    CanvasUnavailable { name: String, detail: String },

    /// JPEG encoding failed.
    #[error("'{name}': JPEG encoding failed: {detail}")]
    EncodeFailed { name: String, detail: String },

    /// Uploading the normalised image failed.
    #[error("'{name}': {source}")]
    Upload {
        name: String,
        #[source]
        source: UploadError,
    },

    /// The local preview copy could not be written.
    #[error("'{name}': cannot create preview: {detail}")]
    PreviewFailed { name: String, detail: String },
}

impl ItemError {
    /// The file (or frame) name this error refers to.
    pub fn name(&self) -> &str {
        match self {
            ItemError::FormatUnsupported { name, .. }
            | ItemError::UnsupportedInput { name, .. }
            | ItemError::ReadFailed { name, .. }
            | ItemError::DecodeFailed { name, .. }
            | ItemError::CanvasUnavailable { name, .. }
            | ItemError::EncodeFailed { name, .. }
            | ItemError::Upload { name, .. }
            | ItemError::PreviewFailed { name, .. } => name,
        }
    }
}

/// Failure reported by an [`crate::backend::Uploader`].
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum UploadError {
    /// The request never completed (DNS, TLS, connection reset, timeout).
    #[error("upload failed: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("upload failed: HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The storage backend refused or failed to persist the bytes.
    #[error("upload failed: storage error: {0}")]
    Storage(String),

    /// The server answered 2xx but the body was not `{url, mediaId}`.
    #[error("upload failed: invalid response: {0}")]
    InvalidResponse(String),
}

/// Failure reported by an [`crate::backend::OcrService`].
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum OcrError {
    /// The request never completed.
    #[error("OCR failed: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("OCR failed: HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The vision model returned an error.
    #[error("OCR failed: model error for '{remote_id}': {detail}")]
    Model { remote_id: String, detail: String },

    /// A remote id could not be resolved to stored media.
    #[error("OCR failed: no media found for '{remote_id}'")]
    MediaNotFound { remote_id: String },

    /// The response body could not be parsed.
    #[error("OCR failed: invalid response: {0}")]
    InvalidResponse(String),
}

/// Camera capability errors.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum CameraError {
    /// `acquire` called while the camera is already streaming.
    #[error("camera is already active; release it before acquiring again")]
    AlreadyActive,

    /// `grab_frame` called without an active stream.
    #[error("camera is not active; acquire it first")]
    NotActive,

    /// The device could not be opened or read.
    #[error("camera device error: {0}")]
    Device(String),

    /// The device produced an empty frame.
    #[error("rendering surface unavailable: {0}")]
    CanvasUnavailable(String),
}
