//! Writing finalized text to disk.

use crate::error::CaptureError;
use std::path::Path;

/// Write `text` to `path` atomically (temp file + rename).
///
/// Parent directories are created as needed. A crash mid-write leaves at
/// most a stray `.txt.tmp` file, never a truncated output.
pub async fn write_text_atomic(path: &Path, text: &str) -> Result<(), CaptureError> {
    let fail = |source| CaptureError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(fail)?;
        }
    }

    let tmp_path = path.with_extension("txt.tmp");
    tokio::fs::write(&tmp_path, text).await.map_err(fail)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(fail)?;
    Ok(())
}
