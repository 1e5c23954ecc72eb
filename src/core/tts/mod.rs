mod base;
pub mod murf;

pub use base::{BaseTTS, TTSConfig, TTSError, TTSEvent, TTSResult};
pub use murf::{MURF_TTS_URL, MurfTTS};

/// Supported TTS providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TTSProvider {
    /// Murf stream-input WebSocket API
    Murf,
}

impl std::fmt::Display for TTSProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TTSProvider::Murf => write!(f, "murf"),
        }
    }
}

impl std::str::FromStr for TTSProvider {
    type Err = TTSError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "murf" | "murf-ai" => Ok(TTSProvider::Murf),
            _ => Err(TTSError::ConfigurationError(format!(
                "Unsupported TTS provider: {s}. Supported providers: murf"
            ))),
        }
    }
}

/// Factory function to create a TTS provider.
pub fn create_tts_provider(provider_type: &str, config: TTSConfig) -> TTSResult<Box<dyn BaseTTS>> {
    match provider_type.parse::<TTSProvider>()? {
        TTSProvider::Murf => Ok(Box::new(MurfTTS::new(config)?)),
    }
}
