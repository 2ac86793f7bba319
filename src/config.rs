//! Configuration types for page capture.
//!
//! All capture behaviour is controlled through [`CaptureConfig`], built via
//! its [`CaptureConfigBuilder`]. The per-image knobs the encoder needs are
//! split out into [`NormalizationOptions`] so the pipeline never sees
//! backend or provider settings.

use crate::error::CaptureError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Upload ceiling enforced by the journal backend: 9.5 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 9 * 1024 * 1024 + 512 * 1024;

/// JPEG quality ladder, tried in order until the output fits the ceiling.
///
/// Equivalent to the 0.8 / 0.7 / 0.6 / 0.5 quality factors of a browser
/// canvas encoder.
pub const QUALITY_STEPS: [u8; 4] = [80, 70, 60, 50];

/// Default longest-edge cap in pixels.
pub const DEFAULT_MAX_DIMENSION_PX: u32 = 2048;

/// Default model used for direct OCR when none is configured.
pub const DEFAULT_OCR_MODEL: &str = "gpt-5-mini";

/// Per-image settings for the normalisation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationOptions {
    /// Longest edge of the encoded image in pixels. Images are never upscaled.
    pub max_dimension_px: u32,
    /// Replace colour with perceptual luma before encoding.
    pub grayscale: bool,
    /// Byte ceiling the encoder tries to stay under.
    pub max_upload_bytes: usize,
}

impl Default for NormalizationOptions {
    fn default() -> Self {
        Self {
            max_dimension_px: DEFAULT_MAX_DIMENSION_PX,
            grayscale: false,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Configuration for a capture session.
///
/// # Example
/// ```rust
/// use journal_capture::CaptureConfig;
///
/// let config = CaptureConfig::builder()
///     .max_dimension_px(1600)
///     .grayscale(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.normalization.max_dimension_px, 1600);
/// ```
#[derive(Clone)]
pub struct CaptureConfig {
    /// Encoder settings applied to every staged image.
    pub normalization: NormalizationOptions,

    /// Program used to convert HEIC/HEIF to JPEG. Default: `heif-convert`.
    ///
    /// Invoked as `<program> <input> <output>`; ImageMagick's `magick`
    /// accepts the same argument order.
    pub heic_converter: String,

    /// Base URL of the journal web app. `None` selects local mode.
    pub backend_url: Option<String>,

    /// Value sent as `x-user-id` to the journal web app.
    pub user_id: Option<String>,

    /// Directory used by the local media store. Default: `./journal-media`.
    pub store_dir: PathBuf,

    /// Vision model identifier for direct OCR, e.g. "gpt-5-mini".
    pub model: Option<String>,

    /// Vision provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed vision provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Custom OCR system prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Sampling temperature for direct OCR. Default: 0.0.
    pub temperature: f32,

    /// Timeout for a single HTTP request in seconds. Default: 120.
    ///
    /// OCR over a dozen pages is one request, so this is generous.
    pub request_timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            normalization: NormalizationOptions::default(),
            heic_converter: "heif-convert".to_string(),
            backend_url: None,
            user_id: None,
            store_dir: PathBuf::from("journal-media"),
            model: None,
            provider_name: None,
            provider: None,
            system_prompt: None,
            max_tokens: 4096,
            temperature: 0.0,
            request_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for CaptureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureConfig")
            .field("normalization", &self.normalization)
            .field("heic_converter", &self.heic_converter)
            .field("backend_url", &self.backend_url)
            .field("user_id", &self.user_id)
            .field("store_dir", &self.store_dir)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl CaptureConfig {
    /// Create a new builder for `CaptureConfig`.
    pub fn builder() -> CaptureConfigBuilder {
        CaptureConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`CaptureConfig`].
#[derive(Debug)]
pub struct CaptureConfigBuilder {
    config: CaptureConfig,
}

impl CaptureConfigBuilder {
    pub fn max_dimension_px(mut self, px: u32) -> Self {
        self.config.normalization.max_dimension_px = px;
        self
    }

    pub fn grayscale(mut self, v: bool) -> Self {
        self.config.normalization.grayscale = v;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.normalization.max_upload_bytes = bytes;
        self
    }

    pub fn heic_converter(mut self, program: impl Into<String>) -> Self {
        self.config.heic_converter = program.into();
        self
    }

    pub fn backend_url(mut self, url: impl Into<String>) -> Self {
        self.config.backend_url = Some(url.into());
        self
    }

    pub fn user_id(mut self, id: impl Into<String>) -> Self {
        self.config.user_id = Some(id.into());
        self
    }

    pub fn store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.store_dir = dir.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CaptureConfig, CaptureError> {
        let c = &self.config;
        if c.normalization.max_dimension_px == 0 {
            return Err(CaptureError::InvalidConfig(
                "Max dimension must be ≥ 1 px".into(),
            ));
        }
        if c.normalization.max_upload_bytes == 0 {
            return Err(CaptureError::InvalidConfig(
                "Upload ceiling must be ≥ 1 byte".into(),
            ));
        }
        if c.heic_converter.trim().is_empty() {
            return Err(CaptureError::InvalidConfig(
                "HEIC converter program must not be empty".into(),
            ));
        }
        if let Some(ref url) = c.backend_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(CaptureError::InvalidConfig(format!(
                    "Backend URL must be http:// or https://, got '{url}'"
                )));
            }
        }
        Ok(self.config)
    }
}
