//! Prompts for direct vision-model OCR.
//!
//! Callers can override the system prompt via
//! [`crate::config::CaptureConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// Default system prompt for transcribing a handwritten journal page.
pub const OCR_SYSTEM_PROMPT: &str = "You are an OCR engine. Extract verbatim text from the provided images. \
Preserve line breaks. Do not add or infer content. Output plain text only.";

/// User-turn text sent alongside each page image.
pub const OCR_USER_PROMPT: &str = "Extract verbatim text from this image.";
