//! Events the coordinator emits towards the client, in delivery order.
//!
//! Serialized as JSON objects tagged by `type`.

use serde::Serialize;
use serde_json::Value;

use crate::core::audio::AudioChunkEnvelope;
use crate::core::llm::{LookupKind, LookupReport};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    Info {
        message: String,
        /// Processed audio in seconds, on recognizer termination
        #[serde(skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
    },
    Partial {
        text: String,
    },
    Transcript {
        text: String,
        end_of_turn: bool,
    },
    TurnEnd,
    LlmChunk {
        text: String,
    },
    LlmResponse {
        text: String,
    },
    Weather {
        data: Value,
        text: String,
    },
    News {
        data: Value,
        text: String,
    },
    AudioStart {
        context_id: String,
        message: String,
    },
    AudioChunk(AudioChunkEnvelope),
    AudioComplete {
        context_id: String,
        total_chunks: u32,
        message: String,
    },
    AudioError {
        #[serde(skip_serializing_if = "Option::is_none")]
        context_id: Option<String>,
        message: String,
    },
    Error {
        message: String,
    },
}

impl TurnEvent {
    pub fn info(message: impl Into<String>) -> Self {
        TurnEvent::Info {
            message: message.into(),
            duration: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        TurnEvent::Error {
            message: message.into(),
        }
    }

    /// Wire name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            TurnEvent::Info { .. } => "info",
            TurnEvent::Partial { .. } => "partial",
            TurnEvent::Transcript { .. } => "transcript",
            TurnEvent::TurnEnd => "turn_end",
            TurnEvent::LlmChunk { .. } => "llm_chunk",
            TurnEvent::LlmResponse { .. } => "llm_response",
            TurnEvent::Weather { .. } => "weather",
            TurnEvent::News { .. } => "news",
            TurnEvent::AudioStart { .. } => "audio_start",
            TurnEvent::AudioChunk(_) => "audio_chunk",
            TurnEvent::AudioComplete { .. } => "audio_complete",
            TurnEvent::AudioError { .. } => "audio_error",
            TurnEvent::Error { .. } => "error",
        }
    }
}

impl From<LookupReport> for TurnEvent {
    fn from(report: LookupReport) -> Self {
        match report.kind {
            LookupKind::Weather => TurnEvent::Weather {
                data: report.data,
                text: report.text,
            },
            LookupKind::News => TurnEvent::News {
                data: report.data,
                text: report.text,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shapes() {
        assert_eq!(
            serde_json::to_value(TurnEvent::TurnEnd).unwrap(),
            json!({"type": "turn_end"})
        );
        assert_eq!(
            serde_json::to_value(TurnEvent::Transcript {
                text: "hi".to_string(),
                end_of_turn: true
            })
            .unwrap(),
            json!({"type": "transcript", "text": "hi", "end_of_turn": true})
        );
        assert_eq!(
            serde_json::to_value(TurnEvent::info("Connected successfully")).unwrap(),
            json!({"type": "info", "message": "Connected successfully"})
        );
    }

    #[test]
    fn test_audio_chunk_is_flattened() {
        let event = TurnEvent::AudioChunk(AudioChunkEnvelope {
            context_id: "ctx".to_string(),
            chunk_number: 2,
            total_chunks_so_far: 2,
            audio: "AAAA".to_string(),
            format: "wav_base64".to_string(),
            is_final: false,
            play_at_ms: Some(120),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "audio_chunk");
        assert_eq!(value["chunk_number"], 2);
        assert_eq!(value["play_at_ms"], 120);
        assert_eq!(event.kind(), "audio_chunk");
    }

    #[test]
    fn test_lookup_conversion() {
        let event: TurnEvent = LookupReport {
            kind: LookupKind::News,
            data: json!([]),
            text: "none".to_string(),
        }
        .into();
        assert_eq!(serde_json::to_value(&event).unwrap()["type"], "news");
    }
}
