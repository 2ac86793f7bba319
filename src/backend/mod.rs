//! Remote collaborators: where staged pages are stored and who reads them.
//!
//! The staging queue only ever talks to two traits:
//!
//! * [`Uploader`] — persist normalised bytes, hand back a remote id and URL.
//! * [`OcrService`] — turn an ordered list of remote ids into text.
//!
//! Two deployments are provided:
//!
//! | Backend | Uploader | OCR |
//! |---------|----------|-----|
//! | [`http::HttpBackend`] | `POST /api/upload-url` | `POST /api/ocr` |
//! | local   | [`local::LocalStore`] | [`vision::VisionOcr`] over the store |

use crate::config::CaptureConfig;
use crate::error::{CaptureError, OcrError, UploadError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub mod http;
pub mod local;
pub mod vision;

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub remote_id: String,
    pub url: String,
}

/// One page of OCR output as reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrPageResult {
    pub remote_id: String,
    pub text: String,
}

/// OCR output keyed by remote id.
///
/// Collaborators may answer in any order and may omit ids entirely; a
/// missing id reads as empty text rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcrResults {
    texts: HashMap<String, String>,
}

impl OcrResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, remote_id: impl Into<String>, text: impl Into<String>) {
        self.texts.insert(remote_id.into(), text.into());
    }

    /// Text for `remote_id`, or `""` when the collaborator omitted it.
    pub fn text_for(&self, remote_id: &str) -> &str {
        self.texts.get(remote_id).map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

impl Extend<OcrPageResult> for OcrResults {
    fn extend<I: IntoIterator<Item = OcrPageResult>>(&mut self, iter: I) {
        for page in iter {
            self.insert(page.remote_id, page.text);
        }
    }
}

impl FromIterator<OcrPageResult> for OcrResults {
    fn from_iter<I: IntoIterator<Item = OcrPageResult>>(iter: I) -> Self {
        let mut results = Self::new();
        results.extend(iter);
        results
    }
}

/// Persists normalised page images.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<UploadReceipt, UploadError>;
}

/// Extracts text from previously uploaded pages.
#[async_trait]
pub trait OcrService: Send + Sync {
    /// `remote_ids` is in page order; the answer need not be.
    async fn extract_text(&self, remote_ids: &[String]) -> Result<OcrResults, OcrError>;
}

/// Stored media, fetched back by remote id.
#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Read access to uploaded media, used by OCR engines that need the pixels.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch(&self, remote_id: &str) -> Result<StoredMedia, OcrError>;
}

/// Upload and OCR collaborators selected by configuration.
pub struct Backends {
    pub uploader: Arc<dyn Uploader>,
    pub ocr: Arc<dyn OcrService>,
}

/// Build the collaborators for `config`.
///
/// With `backend_url` set, both roles go to the journal web app. Otherwise
/// pages are stored under `store_dir` and read back by a vision model.
pub fn connect(config: &CaptureConfig) -> Result<Backends, CaptureError> {
    if let Some(ref url) = config.backend_url {
        info!("Using journal backend at {}", url);
        let backend = Arc::new(http::HttpBackend::new(
            url.as_str(),
            config.user_id.clone(),
            config.request_timeout_secs,
        )?);
        return Ok(Backends {
            uploader: backend.clone(),
            ocr: backend,
        });
    }

    info!("Using local store at {}", config.store_dir.display());
    let store = local::LocalStore::new(config.store_dir.clone());
    let ocr = vision::VisionOcr::from_config(store.clone(), config)?;
    Ok(Backends {
        uploader: Arc::new(store),
        ocr: Arc::new(ocr),
    })
}
