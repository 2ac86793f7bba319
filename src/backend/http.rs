//! Journal web-app backend: upload and OCR over its REST endpoints.
//!
//! ```text
//! POST {base}/api/upload-url   multipart "file"      → {"url", "mediaId"}
//! POST {base}/api/ocr          {"mediaIds": [...]}   → {"results": [{"mediaId", "text", …}]}
//! ```
//!
//! The OCR endpoint answers with whatever subset of media it found, in
//! whatever order it processed them. Entries are tolerated with missing
//! fields; anything without a `mediaId` is ignored.

use super::{OcrPageResult, OcrResults, OcrService, UploadReceipt, Uploader};
use crate::error::{CaptureError, OcrError, UploadError};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const USER_ID_HEADER: &str = "x-user-id";

/// Client for the journal web app.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    user_id: Option<String>,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        user_id: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CaptureError::Internal(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_user(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.user_id {
            Some(ref id) => req.header(USER_ID_HEADER, id),
            None => req,
        }
    }
}

#[async_trait]
impl Uploader for HttpBackend {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<UploadReceipt, UploadError> {
        let size = bytes.len();
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        let form = Form::new().part("file", part);

        let response = self
            .with_user(self.client.post(self.endpoint("/api/upload-url")))
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(UploadError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let receipt = parse_upload_response(&body)?;
        info!("Uploaded '{}' ({} bytes) → {}", file_name, size, receipt.remote_id);
        Ok(receipt)
    }
}

#[async_trait]
impl OcrService for HttpBackend {
    async fn extract_text(&self, remote_ids: &[String]) -> Result<OcrResults, OcrError> {
        let request = OcrRequest {
            media_ids: remote_ids.to_vec(),
        };

        let response = self
            .with_user(self.client.post(self.endpoint("/api/ocr")))
            .json(&request)
            .send()
            .await
            .map_err(|e| OcrError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OcrError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(OcrError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let results = parse_ocr_response(&body)?;
        debug!("OCR returned {}/{} pages", results.len(), remote_ids.len());
        Ok(results)
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OcrRequest {
    media_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    #[serde(alias = "remoteId")]
    media_id: String,
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    results: Vec<OcrResponseEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OcrResponseEntry {
    #[serde(default)]
    media_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// Parse the upload endpoint's JSON body.
pub fn parse_upload_response(body: &str) -> Result<UploadReceipt, UploadError> {
    let parsed: UploadResponse =
        serde_json::from_str(body).map_err(|e| UploadError::InvalidResponse(e.to_string()))?;
    Ok(UploadReceipt {
        remote_id: parsed.media_id,
        url: parsed.url,
    })
}

/// Parse the OCR endpoint's JSON body into a lookup table.
pub fn parse_ocr_response(body: &str) -> Result<OcrResults, OcrError> {
    let parsed: OcrResponse =
        serde_json::from_str(body).map_err(|e| OcrError::InvalidResponse(e.to_string()))?;
    Ok(parsed
        .results
        .into_iter()
        .filter_map(|entry| {
            entry.media_id.map(|remote_id| OcrPageResult {
                remote_id,
                text: entry.text.unwrap_or_default(),
            })
        })
        .collect())
}
