//! Murf streaming text-to-speech (`stream-input` WebSocket API).

mod client;
mod config;
mod messages;

pub use client::MurfTTS;
pub use config::{MURF_TTS_URL, MurfTTSConfig};
pub use messages::{EndMessage, MurfResponse, TextMessage, VoiceConfigMessage, VoiceSettings};
