//! HEIC/HEIF → JPEG conversion.
//!
//! There is no pure-Rust HEIC decoder we can depend on, so conversion is an
//! external capability behind [`HeicConverter`]. The default implementation
//! runs a CLI converter (libheif's `heif-convert`, or ImageMagick's `magick`)
//! on a scratch copy of the input.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Converts HEIC bytes into bytes the `image` crate can decode.
///
/// Errors are plain strings: the caller wraps them in
/// [`crate::error::ItemError::FormatUnsupported`] with the file name.
#[async_trait]
pub trait HeicConverter: Send + Sync {
    async fn convert(&self, heic: &[u8]) -> Result<Vec<u8>, String>;
}

/// Converter that shells out to `<program> <input.heic> <output.jpg>`.
#[derive(Debug, Clone)]
pub struct CommandHeicConverter {
    program: PathBuf,
}

impl CommandHeicConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CommandHeicConverter {
    fn default() -> Self {
        Self::new("heif-convert")
    }
}

#[async_trait]
impl HeicConverter for CommandHeicConverter {
    #[instrument(level = "debug", skip_all, fields(program = %self.program.display()))]
    async fn convert(&self, heic: &[u8]) -> Result<Vec<u8>, String> {
        let tmpdir = tempfile::TempDir::with_prefix("heic")
            .map_err(|e| format!("cannot create scratch directory: {e}"))?;
        let input_path = tmpdir.path().join("input.heic");
        let output_path = tmpdir.path().join("output.jpg");

        tokio::fs::write(&input_path, heic)
            .await
            .map_err(|e| format!("cannot write converter input: {e}"))?;

        let output = Command::new(&self.program)
            .arg(&input_path)
            .arg(&output_path)
            .output()
            .await
            .map_err(|e| format!("cannot run {}: {e}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            ));
        }

        let jpeg = tokio::fs::read(&output_path)
            .await
            .map_err(|e| format!("converter produced no output: {e}"))?;
        debug!("Converted {} HEIC bytes → {} JPEG bytes", heic.len(), jpeg.len());
        Ok(jpeg)
    }
}
