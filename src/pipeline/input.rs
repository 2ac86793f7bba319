//! Input resolution: turn raw bytes of unknown provenance into a decodable raster.
//!
//! Journal photos arrive as camera frames or as files picked from a phone
//! gallery, which in practice means JPEG, PNG, WebP, and Apple's HEIC.
//! The `image` crate decodes everything except HEIC, so HEIC is routed
//! through a [`HeicConverter`] first. Anything that is neither image-like
//! nor HEIC is rejected before we spend time decoding it.

use crate::error::ItemError;
use crate::pipeline::heic::HeicConverter;
use std::path::Path;
use tracing::debug;

/// Raw bytes plus whatever the source told us about them.
#[derive(Debug, Clone)]
pub struct RawImage {
    /// File name shown in progress output and used for the upload.
    pub name: String,
    /// Declared media type (`File.type` equivalent), if any.
    pub declared_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl RawImage {
    pub fn new(name: impl Into<String>, declared_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            declared_type,
            bytes,
        }
    }

    /// Media type from the declaration, else the extension, else the bytes.
    pub fn media_type(&self) -> String {
        if let Some(ref t) = self.declared_type {
            if !t.trim().is_empty() {
                return t.trim().to_ascii_lowercase();
            }
        }
        if let Some(guess) = mime_guess::from_path(&self.name).first() {
            return guess.essence_str().to_string();
        }
        if let Ok(format) = image::guess_format(&self.bytes) {
            return format.to_mime_type().to_string();
        }
        "application/octet-stream".to_string()
    }
}

/// How the pipeline must treat an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Decodable directly by the `image` crate.
    Raster,
    /// Needs HEIC → JPEG conversion first.
    Heic,
    /// Not something we can turn into a page image.
    Unsupported,
}

/// Classify an input by declared type and file name.
pub fn classify(raw: &RawImage) -> InputKind {
    if is_heic(raw) {
        return InputKind::Heic;
    }
    if raw.media_type().starts_with("image/") {
        InputKind::Raster
    } else {
        InputKind::Unsupported
    }
}

fn is_heic(raw: &RawImage) -> bool {
    let declared = raw
        .declared_type
        .as_deref()
        .map(|t| t.trim().to_ascii_lowercase());
    if matches!(declared.as_deref(), Some("image/heic" | "image/heif")) {
        return true;
    }
    Path::new(&raw.name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("heic") || e.eq_ignore_ascii_case("heif"))
        .unwrap_or(false)
}

/// Produce bytes guaranteed to be a standard-decodable raster.
///
/// HEIC goes through `converter`; a failed conversion is
/// [`ItemError::FormatUnsupported`]. Non-image input is
/// [`ItemError::UnsupportedInput`].
pub async fn normalize_format(
    raw: RawImage,
    converter: &dyn HeicConverter,
) -> Result<RawImage, ItemError> {
    match classify(&raw) {
        InputKind::Raster => Ok(raw),
        InputKind::Heic => {
            debug!("Converting HEIC input '{}'", raw.name);
            let jpeg = converter
                .convert(&raw.bytes)
                .await
                .map_err(|detail| ItemError::FormatUnsupported {
                    name: raw.name.clone(),
                    detail,
                })?;
            Ok(RawImage {
                name: raw.name,
                declared_type: Some("image/jpeg".to_string()),
                bytes: jpeg,
            })
        }
        InputKind::Unsupported => Err(ItemError::UnsupportedInput {
            mime_type: raw.media_type(),
            name: raw.name,
        }),
    }
}

/// Read a local file into a [`RawImage`], leaving the media type undeclared.
pub async fn read_file(path: &Path) -> Result<RawImage, ItemError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ItemError::ReadFailed {
            name: name.clone(),
            detail: e.to_string(),
        })?;

    debug!("Read {} ({} bytes)", path.display(), bytes.len());
    Ok(RawImage::new(name, None, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FailingConverter;

    #[async_trait]
    impl HeicConverter for FailingConverter {
        async fn convert(&self, _heic: &[u8]) -> Result<Vec<u8>, String> {
            Err("no decoder".into())
        }
    }

    struct FixedConverter(Vec<u8>);

    #[async_trait]
    impl HeicConverter for FixedConverter {
        async fn convert(&self, _heic: &[u8]) -> Result<Vec<u8>, String> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn classify_by_extension_and_declared_type() {
        let heic = RawImage::new("IMG_0042.HEIC", None, vec![]);
        assert_eq!(classify(&heic), InputKind::Heic);

        let declared = RawImage::new("blob", Some("image/heif".into()), vec![]);
        assert_eq!(classify(&declared), InputKind::Heic);

        let jpeg = RawImage::new("page.jpg", None, vec![]);
        assert_eq!(classify(&jpeg), InputKind::Raster);

        let pdf = RawImage::new("notes.pdf", None, vec![]);
        assert_eq!(classify(&pdf), InputKind::Unsupported);
    }

    #[test]
    fn media_type_falls_back_to_sniffing() {
        let png_magic = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        let raw = RawImage::new("capture", None, png_magic);
        assert_eq!(raw.media_type(), "image/png");
        assert_eq!(classify(&raw), InputKind::Raster);
    }

    #[tokio::test]
    async fn heic_conversion_failure_is_format_unsupported() {
        let raw = RawImage::new("IMG_0001.heic", None, vec![0; 16]);
        let err = normalize_format(raw, &FailingConverter).await.unwrap_err();
        assert!(matches!(err, ItemError::FormatUnsupported { .. }));
        assert_eq!(err.name(), "IMG_0001.heic");
    }

    #[tokio::test]
    async fn heic_conversion_success_declares_jpeg() {
        let raw = RawImage::new("IMG_0001.heic", None, vec![0; 16]);
        let out = normalize_format(raw, &FixedConverter(vec![0xFF, 0xD8, 0xFF]))
            .await
            .unwrap();
        assert_eq!(out.declared_type.as_deref(), Some("image/jpeg"));
        assert_eq!(out.bytes, vec![0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn text_input_is_unsupported() {
        let raw = RawImage::new("todo.txt", None, b"buy milk".to_vec());
        let err = normalize_format(raw, &FailingConverter).await.unwrap_err();
        match err {
            ItemError::UnsupportedInput { mime_type, .. } => assert_eq!(mime_type, "text/plain"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_read_failed() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_file(&dir.path().join("nope.jpg")).await.unwrap_err();
        assert!(matches!(err, ItemError::ReadFailed { .. }));
    }
}
