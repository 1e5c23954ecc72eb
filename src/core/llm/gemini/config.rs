//! Configuration for the Gemini streaming generator.

use url::Url;

use crate::core::llm::base::{LLMConfig, LLMError};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct GeminiLLMConfig {
    pub base: LLMConfig,
}

impl GeminiLLMConfig {
    pub fn from_base(base: LLMConfig) -> Self {
        Self { base }
    }

    /// `{base}/v1beta/models/{model}:streamGenerateContent?alt=sse`
    pub fn stream_url(&self) -> Result<Url, LLMError> {
        let base = self
            .base
            .base_url
            .as_deref()
            .unwrap_or(GEMINI_BASE_URL)
            .trim_end_matches('/');
        let raw = format!(
            "{base}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base.model
        );
        Url::parse(&raw)
            .map_err(|e| LLMError::ConfigurationError(format!("Invalid Gemini URL {raw}: {e}")))
    }
}
