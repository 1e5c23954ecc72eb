//! Murf stream-input WebSocket messages.

use serde::{Deserialize, Serialize};

use crate::core::tts::base::TTSConfig;

// =============================================================================
// Outgoing
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSettings {
    pub voice_id: String,
    pub style: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation: Option<f32>,
}

/// First message on every connection.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceConfigMessage {
    pub voice_config: VoiceSettings,
}

impl From<&TTSConfig> for VoiceConfigMessage {
    fn from(config: &TTSConfig) -> Self {
        Self {
            voice_config: VoiceSettings {
                voice_id: config.voice_id.clone(),
                style: config.style.clone(),
                rate: config.rate,
                pitch: config.pitch,
                variation: config.variation,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TextMessage<'a> {
    pub text: &'a str,
}

/// Flush buffered text and finish the context.
#[derive(Debug, Clone, Serialize)]
pub struct EndMessage {
    pub end: bool,
}

impl Default for EndMessage {
    fn default() -> Self {
        Self { end: true }
    }
}

// =============================================================================
// Incoming
// =============================================================================

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MurfResponse {
    /// Base64 encoded WAV audio
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default, rename = "final")]
    pub is_final: bool,
    #[serde(default)]
    pub error: Option<String>,
}
