//! Filesystem media store for offline use.
//!
//! Each upload becomes `<uuid>.<ext>` in the store directory. The uuid is
//! the remote id and a `file://` URL is returned alongside it, mirroring the
//! `{mediaId, url}` shape of the web backend.

use super::{MediaSource, StoredMedia, UploadReceipt, Uploader};
use crate::error::{OcrError, UploadError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Media store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locate the stored file for `remote_id`, if any.
    async fn locate(&self, remote_id: &str) -> Result<Option<PathBuf>, OcrError> {
        // Only ids we minted are valid; this also keeps ids from escaping `root`.
        if Uuid::parse_str(remote_id).is_err() {
            return Ok(None);
        }
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(OcrError::Transport(e.to_string())),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OcrError::Transport(e.to_string()))?
        {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(remote_id) {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

fn extension_for(mime_type: &str, file_name: &str) -> String {
    // mime_guess lists "jfif" first for JPEG.
    if mime_type == "image/jpeg" {
        return "jpg".to_string();
    }
    mime_guess::get_mime_extensions_str(mime_type)
        .and_then(|exts| exts.first())
        .map(|e| e.to_string())
        .or_else(|| {
            Path::new(file_name)
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
        })
        .unwrap_or_else(|| "bin".to_string())
}

#[async_trait]
impl Uploader for LocalStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<UploadReceipt, UploadError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| UploadError::Storage(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        let path = self
            .root
            .join(format!("{}.{}", id, extension_for(mime_type, file_name)));

        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| UploadError::Storage(e.to_string()))?;

        let absolute = tokio::fs::canonicalize(&path).await.unwrap_or(path);
        info!("Stored '{}' ({} bytes) as {}", file_name, bytes.len(), id);
        Ok(UploadReceipt {
            remote_id: id,
            url: format!("file://{}", absolute.display()),
        })
    }
}

#[async_trait]
impl MediaSource for LocalStore {
    async fn fetch(&self, remote_id: &str) -> Result<StoredMedia, OcrError> {
        let path = self
            .locate(remote_id)
            .await?
            .ok_or_else(|| OcrError::MediaNotFound {
                remote_id: remote_id.to_string(),
            })?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| OcrError::Transport(e.to_string()))?;
        let mime_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        debug!("Fetched {} ({} bytes, {})", remote_id, bytes.len(), mime_type);
        Ok(StoredMedia { bytes, mime_type })
    }
}
