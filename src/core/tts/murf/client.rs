//! Murf stream-input WebSocket client.
//!
//! Every `synthesize` call opens its own connection: voice config, then the
//! text, then `{"end": true}`. Audio arrives as base64 WAV chunks until a
//! message flagged `final`.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use super::config::MurfTTSConfig;
use super::messages::{EndMessage, MurfResponse, TextMessage, VoiceConfigMessage};
use crate::core::stream::{EVENT_BUFFER_SIZE, EventSink, EventStream, event_channel};
use crate::core::tts::base::{BaseTTS, TTSConfig, TTSError, TTSEvent, TTSResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SEND_TIMEOUT: Duration = Duration::from_secs(5);
/// Silence after which a context is treated as finished.
const WS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Events produced by one server frame, and whether the context is done.
#[derive(Debug, PartialEq)]
pub(crate) struct Handled {
    pub events: Vec<TTSEvent>,
    pub done: bool,
}

pub struct MurfTTS {
    config: MurfTTSConfig,
}

impl MurfTTS {
    pub(crate) fn handle_websocket_message(message: Message) -> Handled {
        match message {
            Message::Text(text) => {
                let response: MurfResponse = match serde_json::from_str(&text) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Failed to parse Murf message: {}", e);
                        return Handled {
                            events: Vec::new(),
                            done: false,
                        };
                    }
                };

                if let Some(err) = response.error {
                    error!("Murf TTS error: {}", err);
                    return Handled {
                        events: vec![TTSEvent::Error(TTSError::ProviderError(err).to_string())],
                        done: true,
                    };
                }

                let mut events = Vec::with_capacity(2);
                if let Some(audio) = response.audio.filter(|a| !a.is_empty()) {
                    match BASE64.decode(audio.as_bytes()) {
                        Ok(bytes) => events.push(TTSEvent::Chunk {
                            audio: Bytes::from(bytes),
                            is_final: response.is_final,
                        }),
                        Err(e) => warn!("Dropping undecodable Murf audio: {}", e),
                    }
                }
                if response.is_final {
                    events.push(TTSEvent::Complete);
                }
                Handled {
                    events,
                    done: response.is_final,
                }
            }
            Message::Close(frame) => {
                debug!("Murf WebSocket closed: {:?}", frame);
                Handled {
                    events: vec![TTSEvent::Complete],
                    done: true,
                }
            }
            _ => Handled {
                events: Vec::new(),
                done: false,
            },
        }
    }

    async fn send_json<W, T>(ws_sink: &mut W, value: &T) -> TTSResult<()>
    where
        W: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
        T: serde::Serialize,
    {
        let json = serde_json::to_string(value)
            .map_err(|e| TTSError::InvalidInput(format!("Failed to encode Murf message: {e}")))?;
        timeout(SEND_TIMEOUT, ws_sink.send(Message::Text(json.into())))
            .await
            .map_err(|_| TTSError::Timeout("Sending to Murf".to_string()))?
            .map_err(|e| TTSError::NetworkError(format!("Failed to send to Murf: {e}")))
    }

    async fn run_context<S>(ws_stream: S, sink: EventSink<TTSEvent>)
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
            + Unpin,
    {
        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let mut chunks = 0usize;

        loop {
            tokio::select! {
                _ = sink.cancelled() => {
                    debug!("Murf synthesis cancelled after {} chunks", chunks);
                    let _ = ws_sink.send(Message::Close(None)).await;
                    return;
                }
                message = timeout(WS_MESSAGE_TIMEOUT, ws_stream.next()) => {
                    match message {
                        Ok(Some(Ok(msg))) => {
                            let handled = Self::handle_websocket_message(msg);
                            for event in handled.events {
                                if matches!(event, TTSEvent::Chunk { .. }) {
                                    chunks += 1;
                                }
                                if !sink.send(event).await {
                                    return;
                                }
                            }
                            if handled.done {
                                break;
                            }
                        }
                        Ok(Some(Err(e))) => {
                            let reason = TTSError::NetworkError(format!("Murf WebSocket error: {e}"));
                            error!("{}", reason);
                            sink.send(TTSEvent::Error(reason.to_string())).await;
                            return;
                        }
                        Ok(None) => {
                            sink.send(TTSEvent::Complete).await;
                            break;
                        }
                        Err(_elapsed) => {
                            warn!("Murf idle for {}s, finishing context", WS_MESSAGE_TIMEOUT.as_secs());
                            sink.send(TTSEvent::Complete).await;
                            break;
                        }
                    }
                }
            }
        }

        let _ = ws_sink.send(Message::Close(None)).await;
        info!("Murf synthesis finished with {} chunks", chunks);
    }
}

#[async_trait]
impl BaseTTS for MurfTTS {
    fn new(config: TTSConfig) -> TTSResult<Self> {
        if config.api_key.is_empty() {
            return Err(TTSError::AuthenticationFailed(
                "API key is required for Murf TTS".to_string(),
            ));
        }
        if config.voice_id.trim().is_empty() {
            return Err(TTSError::ConfigurationError(
                "Murf voice id must not be empty".to_string(),
            ));
        }
        Ok(Self {
            config: MurfTTSConfig::from_base(config),
        })
    }

    async fn synthesize(&self, text: &str, context_id: &str) -> TTSResult<EventStream<TTSEvent>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TTSError::InvalidInput("Nothing to synthesize".to_string()));
        }

        let url = self.config.build_websocket_url(context_id)?;
        let (mut ws_stream, _response) = timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
            .await
            .map_err(|_| TTSError::Timeout("Connecting to Murf".to_string()))?
            .map_err(|e| TTSError::ConnectionFailed(format!("Failed to connect to Murf: {e}")))?;

        Self::send_json(&mut ws_stream, &VoiceConfigMessage::from(&self.config.base)).await?;
        Self::send_json(&mut ws_stream, &TextMessage { text }).await?;
        Self::send_json(&mut ws_stream, &EndMessage::default()).await?;

        debug!(context_id, chars = text.len(), "Murf synthesis started");

        let (sink, stream) = event_channel(EVENT_BUFFER_SIZE);
        tokio::spawn(Self::run_context(ws_stream, sink));
        Ok(stream)
    }

    fn sample_rate(&self) -> u32 {
        self.config.base.sample_rate
    }

    fn provider_info(&self) -> &'static str {
        "Murf stream-input TTS"
    }
}
