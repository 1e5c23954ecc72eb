//! Base trait and types for streaming speech-to-text providers.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::core::stream::EventStream;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during speech-to-text operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum STTError {
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

    #[error("Invalid audio format: {0}")]
    InvalidAudioFormat(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type for speech-to-text operations.
pub type STTResult<T> = Result<T, STTError>;

// =============================================================================
// Configuration
// =============================================================================

/// Provider-neutral speech-to-text configuration.
#[derive(Debug, Clone)]
pub struct STTConfig {
    /// API key for the provider
    pub api_key: String,
    /// Sample rate of submitted PCM audio
    pub sample_rate: u32,
    /// Encoding of submitted audio (e.g. "pcm_s16le")
    pub encoding: String,
    /// BCP-47 language hint
    pub language: String,
    /// Format end-of-turn transcripts (punctuation, casing)
    pub format_turns: bool,
    /// Confidence required before the provider declares end-of-turn
    pub end_of_turn_confidence_threshold: Option<f32>,
    /// Trailing silence before a confident end-of-turn (milliseconds)
    pub min_end_of_turn_silence_ms: Option<u32>,
    /// Silence after which a turn ends regardless of confidence (milliseconds)
    pub max_turn_silence_ms: Option<u32>,
    /// Override for the provider's streaming endpoint
    pub base_url: Option<String>,
}

impl Default for STTConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            sample_rate: 16000,
            encoding: "pcm_s16le".to_string(),
            language: "en".to_string(),
            format_turns: true,
            end_of_turn_confidence_threshold: Some(0.75),
            min_end_of_turn_silence_ms: Some(160),
            max_turn_silence_ms: Some(2400),
            base_url: None,
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Events produced by an open recognition stream, in provider order.
#[derive(Debug, Clone, PartialEq)]
pub enum STTEvent {
    /// Provider accepted the stream
    Ready { session_id: String },
    /// Interim transcript; may be repeated and extended
    Partial { text: String },
    /// Authoritative transcript for a segment
    Final { text: String, end_of_turn: bool },
    /// Stream-level failure; the stream is unusable afterwards
    Error { reason: String },
    /// Provider closed the stream
    Closed { audio_duration_ms: Option<u64> },
}

// =============================================================================
// Trait
// =============================================================================

/// A streaming speech-to-text provider.
///
/// `open` connects and returns the event stream. Audio is then pushed with
/// `submit` until `close`. Connection failures after `open` are reported as
/// [`STTEvent::Error`] on the stream rather than by silently ending it.
#[async_trait]
pub trait BaseSTT: Send + Sync {
    fn new(config: STTConfig) -> STTResult<Self>
    where
        Self: Sized;

    /// Connect to the provider and start receiving events.
    async fn open(&mut self) -> STTResult<EventStream<STTEvent>>;

    /// Push 16-bit PCM audio at the configured sample rate.
    async fn submit(&mut self, audio: Bytes) -> STTResult<()>;

    /// Gracefully end the stream and release the connection.
    async fn close(&mut self) -> STTResult<()>;

    fn is_open(&self) -> bool;

    fn provider_info(&self) -> &'static str;
}
