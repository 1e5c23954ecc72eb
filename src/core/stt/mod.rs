pub mod assemblyai;
mod base;

pub use base::{BaseSTT, STTConfig, STTError, STTEvent, STTResult};

pub use assemblyai::{AssemblyAISTT, AssemblyAISTTConfig};

/// Supported STT providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum STTProvider {
    /// AssemblyAI Streaming STT v3 WebSocket API
    AssemblyAI,
}

impl std::fmt::Display for STTProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            STTProvider::AssemblyAI => write!(f, "assemblyai"),
        }
    }
}

impl std::str::FromStr for STTProvider {
    type Err = STTError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "assemblyai" | "assembly-ai" | "aai" => Ok(STTProvider::AssemblyAI),
            _ => Err(STTError::ConfigurationError(format!(
                "Unsupported STT provider: {s}. Supported providers: assemblyai"
            ))),
        }
    }
}

/// Create a boxed STT provider by name.
pub fn create_stt_provider(
    provider: &str,
    config: STTConfig,
) -> Result<Box<dyn BaseSTT>, STTError> {
    let provider: STTProvider = provider.parse()?;
    create_stt_provider_from_enum(provider, config)
}

pub fn create_stt_provider_from_enum(
    provider: STTProvider,
    config: STTConfig,
) -> Result<Box<dyn BaseSTT>, STTError> {
    match provider {
        STTProvider::AssemblyAI => Ok(Box::new(AssemblyAISTT::new(config)?)),
    }
}

pub fn get_supported_stt_providers() -> Vec<&'static str> {
    vec!["assemblyai"]
}
