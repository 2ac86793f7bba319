//! Direct OCR through a vision LLM.
//!
//! Each remote id is resolved to its stored bytes, sent to the model as a
//! base64 image attachment, and the transcription is cleaned and trimmed.
//! Pages are processed one after another; the first failure fails the whole
//! batch so a finalize never commits a partial transcription.

use super::{MediaSource, OcrPageResult, OcrResults, OcrService};
use crate::config::{CaptureConfig, DEFAULT_OCR_MODEL};
use crate::error::{CaptureError, OcrError};
use crate::pipeline::postprocess::clean_ocr_text;
use crate::prompts::{OCR_SYSTEM_PROMPT, OCR_USER_PROMPT};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// OCR collaborator backed by a vision model and a [`MediaSource`].
pub struct VisionOcr<M> {
    provider: Arc<dyn LLMProvider>,
    media: M,
    system_prompt: String,
    options: CompletionOptions,
}

impl<M: MediaSource> VisionOcr<M> {
    pub fn new(provider: Arc<dyn LLMProvider>, media: M, config: &CaptureConfig) -> Self {
        Self {
            provider,
            media,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| OCR_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
        }
    }

    /// Build from config, resolving the provider the usual way.
    pub fn from_config(media: M, config: &CaptureConfig) -> Result<Self, CaptureError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, media, config))
    }

    async fn ocr_one(&self, remote_id: &str) -> Result<OcrPageResult, OcrError> {
        let start = Instant::now();
        let media = self.media.fetch(remote_id).await?;
        let image = ImageData::new(STANDARD.encode(&media.bytes), media.mime_type.as_str())
            .with_detail("high");

        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(OCR_USER_PROMPT, vec![image]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| OcrError::Model {
                remote_id: remote_id.to_string(),
                detail: e.to_string(),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            remote_id,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(OcrPageResult {
            remote_id: remote_id.to_string(),
            text: clean_ocr_text(&response.content),
        })
    }
}

#[async_trait]
impl<M: MediaSource> OcrService for VisionOcr<M> {
    async fn extract_text(&self, remote_ids: &[String]) -> Result<OcrResults, OcrError> {
        info!("Running vision OCR on {} pages", remote_ids.len());
        let mut results = OcrResults::new();
        for remote_id in remote_ids {
            let page = self.ocr_one(remote_id).await?;
            results.extend(std::iter::once(page));
        }
        Ok(results)
    }
}

fn build_options(config: &CaptureConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, CaptureError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        CaptureError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Configured model, else `OCR_MODEL_ID`, else [`DEFAULT_OCR_MODEL`].
fn ocr_model(config: &CaptureConfig) -> String {
    config
        .model
        .clone()
        .or_else(|| std::env::var("OCR_MODEL_ID").ok().filter(|m| !m.is_empty()))
        .unwrap_or_else(|| DEFAULT_OCR_MODEL.to_string())
}

/// Resolve the vision provider, from most-specific to least-specific.
///
/// 1. Pre-built provider (`config.provider`)
/// 2. Named provider + model (`config.provider_name`)
/// 3. `OPENAI_API_KEY` present → OpenAI
/// 4. `ProviderFactory::from_env` auto-detection
///
/// The model falls back to `OCR_MODEL_ID`, then [`DEFAULT_OCR_MODEL`].
pub fn resolve_provider(config: &CaptureConfig) -> Result<Arc<dyn LLMProvider>, CaptureError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = ocr_model(config);

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, &model);
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_provider("openai", &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| CaptureError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::local::LocalStore;
    use crate::backend::Uploader;
    use edgequake_llm::{LLMResponse, LlmError};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers chat calls from a fixed script; `Err` entries become API errors.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<&'static str, &'static str>>>,
        image_types: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<&'static str, &'static str>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                image_types: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-vision"
        }

        fn max_context_length(&self) -> usize {
            8192
        }

        async fn complete(&self, _prompt: &str) -> edgequake_llm::Result<LLMResponse> {
            Err(LlmError::InvalidRequest("chat only".into()))
        }

        async fn complete_with_options(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.complete(prompt).await
        }

        async fn chat(
            &self,
            messages: &[ChatMessage],
            _options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<LLMResponse> {
            let types: Vec<String> = messages
                .iter()
                .filter_map(|m| m.images.as_ref())
                .flatten()
                .map(|img| img.mime_type.clone())
                .collect();
            self.image_types.lock().unwrap().extend(types);

            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                Some(Ok(text)) => Ok(LLMResponse::new(text, "scripted-vision")),
                Some(Err(e)) => Err(LlmError::ApiError(e.to_string())),
                None => Err(LlmError::ApiError("no reply scripted".into())),
            }
        }
    }

    async fn store_with_pages(dir: &std::path::Path, n: usize) -> (LocalStore, Vec<String>) {
        let store = LocalStore::new(dir);
        let mut ids = Vec::new();
        for i in 0..n {
            let receipt = store
                .upload(vec![0xFF, 0xD8, i as u8], &format!("p{i}.jpg"), "image/jpeg")
                .await
                .unwrap();
            ids.push(receipt.remote_id);
        }
        (store, ids)
    }

    #[tokio::test]
    async fn pages_are_read_in_order_and_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let (store, ids) = store_with_pages(dir.path(), 2).await;
        let provider = ScriptedProvider::new(vec![
            Ok("```text\r\nDear diary,\r\nrain again.  \r\n```"),
            Ok("  second page\u{200B}\n"),
        ]);
        let ocr = VisionOcr::new(provider.clone(), store, &CaptureConfig::default());

        let results = ocr.extract_text(&ids).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results.text_for(&ids[0]), "Dear diary,\nrain again.");
        assert_eq!(results.text_for(&ids[1]), "second page");
        assert_eq!(
            *provider.image_types.lock().unwrap(),
            ["image/jpeg", "image/jpeg"]
        );
    }

    #[tokio::test]
    async fn provider_error_fails_the_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (store, ids) = store_with_pages(dir.path(), 3).await;
        let provider = ScriptedProvider::new(vec![Ok("one"), Err("overloaded"), Ok("three")]);
        let ocr = VisionOcr::new(provider.clone(), store, &CaptureConfig::default());

        let err = ocr.extract_text(&ids).await.unwrap_err();
        match err {
            OcrError::Model { remote_id, detail } => {
                assert_eq!(remote_id, ids[1]);
                assert!(detail.contains("overloaded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Stops at the first failure; the third page is never sent.
        assert_eq!(provider.replies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_id_is_media_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (store, mut ids) = store_with_pages(dir.path(), 1).await;
        let missing = uuid::Uuid::new_v4().to_string();
        ids.push(missing.clone());
        let provider = ScriptedProvider::new(vec![Ok("one"), Ok("two")]);
        let ocr = VisionOcr::new(provider, store, &CaptureConfig::default());

        let err = ocr.extract_text(&ids).await.unwrap_err();
        assert!(matches!(err, OcrError::MediaNotFound { ref remote_id } if *remote_id == missing));
    }

    #[test]
    fn build_options_uses_config() {
        let config = CaptureConfig::builder()
            .temperature(0.2)
            .max_tokens(1024)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(1024));
    }

    #[test]
    fn model_falls_back_to_web_app_default() {
        let explicit = CaptureConfig::builder().model("gpt-4.1-mini").build().unwrap();
        assert_eq!(ocr_model(&explicit), "gpt-4.1-mini");

        if std::env::var("OCR_MODEL_ID").is_err() {
            assert_eq!(ocr_model(&CaptureConfig::default()), "gpt-5-mini");
        }
    }

    #[test]
    fn ocr_results_extend_from_pages() {
        let mut results = OcrResults::new();
        results.extend(vec![
            OcrPageResult {
                remote_id: "b".into(),
                text: "y".into(),
            },
            OcrPageResult {
                remote_id: "a".into(),
                text: "x".into(),
            },
        ]);
        assert_eq!(results.text_for("a"), "x");
        assert_eq!(results.text_for("b"), "y");
    }
}
