//! Base trait and types for streaming text-to-speech providers.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::core::stream::EventStream;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TTSError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

pub type TTSResult<T> = Result<T, TTSError>;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct TTSConfig {
    pub api_key: String,
    pub voice_id: String,
    /// Speaking style name (provider specific)
    pub style: String,
    /// Speaking rate adjustment, provider scale
    pub rate: Option<f32>,
    /// Pitch adjustment, provider scale
    pub pitch: Option<f32>,
    /// Prosody variation, provider scale
    pub variation: Option<f32>,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Override for the provider's streaming endpoint
    pub base_url: Option<String>,
}

impl Default for TTSConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            voice_id: "en-US-miles".to_string(),
            style: "Calm".to_string(),
            rate: Some(-0.15),
            pitch: Some(0.0),
            variation: Some(0.2),
            sample_rate: 44100,
            base_url: None,
        }
    }
}

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum TTSEvent {
    /// Encoded audio in provider order. The first chunk of a WAV stream
    /// carries the RIFF header.
    Chunk { audio: Bytes, is_final: bool },
    /// All audio for the utterance has been delivered
    Complete,
    /// Synthesis failed; no further events follow
    Error(String),
}

// =============================================================================
// Trait
// =============================================================================

#[async_trait]
pub trait BaseTTS: Send + Sync {
    fn new(config: TTSConfig) -> TTSResult<Self>
    where
        Self: Sized;

    /// Start synthesizing `text`. Chunks arrive in order, terminated by
    /// exactly one `Complete` or `Error`. Dropping the stream stops synthesis.
    async fn synthesize(&self, text: &str, context_id: &str) -> TTSResult<EventStream<TTSEvent>>;

    fn sample_rate(&self) -> u32;

    fn provider_info(&self) -> &'static str;
}
