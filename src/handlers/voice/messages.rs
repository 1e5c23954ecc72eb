//! Client-facing message types for the voice stream endpoint.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::core::audio::{AudioError, SampleEncoding};
use crate::core::session::SessionCredentials;
use crate::core::turn::TurnEvent;

/// Query parameters accepted on `GET /ws/stream`.
#[derive(Default, Deserialize)]
pub struct StreamParams {
    pub session: Option<String>,
    pub aai: Option<String>,
    pub gemini: Option<String>,
    pub murf: Option<String>,
    pub news: Option<String>,
    pub weather: Option<String>,
    pub persona: Option<String>,
    /// Capture rate of binary frames
    pub sample_rate: Option<u32>,
    /// `pcm_s16le` (default) or `f32le`
    pub encoding: Option<String>,
}

impl std::fmt::Debug for StreamParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamParams")
            .field("session", &self.session)
            .field("persona", &self.persona)
            .field("sample_rate", &self.sample_rate)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl StreamParams {
    /// Client-supplied session id, or `anon-<unix seconds>`.
    pub fn session_id(&self) -> String {
        self.session
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("anon-{}", OffsetDateTime::now_utc().unix_timestamp()))
    }

    /// Move the key overrides out of the query. Blank values count as absent.
    pub fn take_credentials(&mut self) -> SessionCredentials {
        fn take(value: &mut Option<String>) -> Option<String> {
            value.take().filter(|v| !v.trim().is_empty())
        }
        SessionCredentials {
            assemblyai: take(&mut self.aai),
            gemini: take(&mut self.gemini),
            murf: take(&mut self.murf),
            news: take(&mut self.news),
            weather: take(&mut self.weather),
        }
    }

    pub fn encoding(&self) -> Result<SampleEncoding, AudioError> {
        match self.encoding.as_deref() {
            None => Ok(SampleEncoding::Pcm16Le),
            Some(value) => value.parse(),
        }
    }
}

/// Text frames the client may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientText {
    Stop,
    Echo(String),
}

#[derive(Deserialize)]
struct ControlFrame {
    #[serde(rename = "type")]
    message_type: String,
}

/// `stop`, `__stop` and `{"type":"stop"}` stop the current turn; anything
/// else is echoed.
pub fn parse_client_text(text: &str) -> ClientText {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("stop") || trimmed.eq_ignore_ascii_case("__stop") {
        return ClientText::Stop;
    }
    if let Ok(frame) = serde_json::from_str::<ControlFrame>(trimmed)
        && frame.message_type.eq_ignore_ascii_case("stop")
    {
        return ClientText::Stop;
    }
    ClientText::Echo(text.to_string())
}

/// Everything the server sends as a text frame.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    Turn(TurnEvent),
    Echo(EchoMessage),
}

#[derive(Debug, Clone, Serialize)]
pub struct EchoMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub text: String,
}

impl OutgoingMessage {
    pub fn echo(text: impl Into<String>) -> Self {
        OutgoingMessage::Echo(EchoMessage {
            message_type: "echo",
            text: text.into(),
        })
    }

    pub fn info(message: impl Into<String>) -> Self {
        OutgoingMessage::Turn(TurnEvent::info(message))
    }

    pub fn error(message: impl Into<String>) -> Self {
        OutgoingMessage::Turn(TurnEvent::error(message))
    }
}

impl From<TurnEvent> for OutgoingMessage {
    fn from(event: TurnEvent) -> Self {
        OutgoingMessage::Turn(event)
    }
}

/// Work for the socket sender task.
#[derive(Debug)]
pub enum MessageRoute {
    Outgoing(OutgoingMessage),
    Close,
}
