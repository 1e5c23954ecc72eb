mod base;
pub mod gemini;

pub use base::{
    BaseLLM, ChatMessage, GenerationRequest, LLMConfig, LLMError, LLMEvent, LLMResult,
    LookupKind, LookupReport, Role,
};
pub use gemini::GeminiLLM;

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LLMProvider {
    /// Google Gemini streaming API
    Gemini,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::Gemini => write!(f, "gemini"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = LLMError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google-gemini" => Ok(LLMProvider::Gemini),
            _ => Err(LLMError::ConfigurationError(format!(
                "Unsupported LLM provider: {s}. Supported providers: gemini"
            ))),
        }
    }
}

/// Create a boxed LLM provider sharing `client`.
pub fn create_llm_provider(
    provider: &str,
    config: LLMConfig,
    client: reqwest::Client,
) -> Result<Box<dyn BaseLLM>, LLMError> {
    match provider.parse::<LLMProvider>()? {
        LLMProvider::Gemini => Ok(Box::new(GeminiLLM::with_client(config, client)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_llm_provider() {
        let config = LLMConfig {
            api_key: "key".to_string(),
            ..Default::default()
        };
        let llm = create_llm_provider("Gemini", config, reqwest::Client::new()).unwrap();
        assert!(llm.provider_info().contains("Gemini"));

        let err = "openai".parse::<LLMProvider>().unwrap_err();
        assert!(err.to_string().contains("Supported providers: gemini"));
    }
}
