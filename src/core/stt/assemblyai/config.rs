//! Configuration for the AssemblyAI streaming recognizer.

use std::str::FromStr;

use url::Url;

use super::super::base::{STTConfig, STTError};

/// Default streaming endpoint.
pub const ASSEMBLYAI_WS_URL: &str = "wss://streaming.assemblyai.com/v3/ws";

// =============================================================================
// Audio Encoding
// =============================================================================

/// Audio encodings accepted by the streaming endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssemblyAIEncoding {
    /// PCM signed 16-bit little-endian
    #[default]
    PcmS16le,
    /// PCM mu-law (telephony)
    PcmMulaw,
}

impl AssemblyAIEncoding {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PcmS16le => "pcm_s16le",
            Self::PcmMulaw => "pcm_mulaw",
        }
    }
}

impl FromStr for AssemblyAIEncoding {
    type Err = ();

    /// Unknown values fall back to `pcm_s16le`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "pcm_mulaw" | "mulaw" | "ulaw" => Self::PcmMulaw,
            _ => Self::PcmS16le,
        })
    }
}

// =============================================================================
// Speech Model
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssemblyAISpeechModel {
    #[default]
    UniversalStreamingEnglish,
    UniversalStreamingMultilingual,
}

impl AssemblyAISpeechModel {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UniversalStreamingEnglish => "universal-streaming-english",
            Self::UniversalStreamingMultilingual => "universal-streaming-multilingual",
        }
    }

    /// English model for empty or `en*` language hints, multilingual otherwise.
    pub fn for_language(language: &str) -> Self {
        if language.is_empty() || language.starts_with("en") {
            Self::UniversalStreamingEnglish
        } else {
            Self::UniversalStreamingMultilingual
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// AssemblyAI-specific view of an [`STTConfig`].
#[derive(Debug, Clone)]
pub struct AssemblyAISTTConfig {
    pub base: STTConfig,
    pub speech_model: AssemblyAISpeechModel,
    pub encoding: AssemblyAIEncoding,
}

impl AssemblyAISTTConfig {
    pub fn from_base(base: STTConfig) -> Self {
        let encoding = base.encoding.parse().unwrap_or_default();
        let speech_model = AssemblyAISpeechModel::for_language(&base.language);
        Self {
            base,
            speech_model,
            encoding,
        }
    }

    /// Build the WebSocket URL carrying the session parameters as query string.
    pub fn build_websocket_url(&self) -> Result<Url, STTError> {
        let endpoint = self.base.base_url.as_deref().unwrap_or(ASSEMBLYAI_WS_URL);
        let mut url = Url::parse(endpoint).map_err(|e| {
            STTError::ConfigurationError(format!("Invalid AssemblyAI URL {endpoint}: {e}"))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("sample_rate", &self.base.sample_rate.to_string());
            query.append_pair("encoding", self.encoding.as_str());
            query.append_pair("speech_model", self.speech_model.as_str());
            query.append_pair(
                "format_turns",
                if self.base.format_turns { "true" } else { "false" },
            );
            if let Some(threshold) = self.base.end_of_turn_confidence_threshold {
                query.append_pair(
                    "end_of_turn_confidence_threshold",
                    &format!("{:.2}", threshold.clamp(0.0, 1.0)),
                );
            }
            if let Some(ms) = self.base.min_end_of_turn_silence_ms {
                query.append_pair("min_end_of_turn_silence_when_confident", &ms.to_string());
            }
            if let Some(ms) = self.base.max_turn_silence_ms {
                query.append_pair("max_turn_silence", &ms.to_string());
            }
        }

        Ok(url)
    }
}
