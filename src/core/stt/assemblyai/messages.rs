//! WebSocket message types for the AssemblyAI streaming API.
//!
//! Audio goes upstream as raw binary frames. Everything else is JSON tagged
//! by its `type` field.

use serde::{Deserialize, Serialize};

// =============================================================================
// Incoming Messages (Server to Client)
// =============================================================================

/// Sent once the session is established.
#[derive(Debug, Clone, Deserialize)]
pub struct BeginMessage {
    pub id: String,
    /// Session expiration (Unix epoch seconds)
    #[serde(default)]
    pub expires_at: i64,
}

/// Transcript for the current turn.
///
/// Interim turns repeat with a growing transcript. With turn formatting on,
/// an end-of-turn arrives first unformatted and then again formatted.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnMessage {
    pub turn_order: u32,
    pub transcript: String,
    pub end_of_turn: bool,
    #[serde(default)]
    pub turn_is_formatted: bool,
    #[serde(default)]
    pub end_of_turn_confidence: Option<f64>,
}

/// Sent when the session ends.
#[derive(Debug, Clone, Deserialize)]
pub struct TerminationMessage {
    /// Audio processed in this session, in milliseconds
    #[serde(default)]
    pub audio_duration_ms: u64,
    #[serde(default)]
    pub terminated_normally: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMessage {
    #[serde(default)]
    pub error_code: Option<String>,
    pub error: String,
}

// =============================================================================
// Outgoing Messages (Client to Server)
// =============================================================================

/// Ask the server to flush and end the session.
#[derive(Debug, Clone, Serialize)]
pub struct TerminateMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
}

impl Default for TerminateMessage {
    fn default() -> Self {
        Self {
            message_type: "Terminate",
        }
    }
}

// =============================================================================
// Message Enum and Parsing
// =============================================================================

#[derive(Debug)]
pub enum AssemblyAIMessage {
    Begin(BeginMessage),
    Turn(TurnMessage),
    Termination(TerminationMessage),
    Error(ErrorMessage),
    /// Unrecognised type, kept for logging
    Unknown(String),
}

impl AssemblyAIMessage {
    /// Parse a text frame by peeking at its `type` first.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct TypePeek {
            #[serde(rename = "type")]
            message_type: String,
        }

        let peek: TypePeek = serde_json::from_str(text)?;

        match peek.message_type.as_str() {
            "Begin" => Ok(Self::Begin(serde_json::from_str(text)?)),
            "Turn" => Ok(Self::Turn(serde_json::from_str(text)?)),
            "Termination" => Ok(Self::Termination(serde_json::from_str(text)?)),
            "Error" => Ok(Self::Error(serde_json::from_str(text)?)),
            _ => Ok(Self::Unknown(text.to_string())),
        }
    }
}
