//! AssemblyAI STT WebSocket client.
//!
//! `open` connects, waits for the `Begin` message and returns an
//! [`EventStream`] of [`STTEvent`]s. A single connection task owns the socket:
//! it forwards submitted audio as binary frames and translates server
//! messages into events.
//!
//! ```text
//! submit() ──▶ audio_tx (mpsc) ──▶ connection task ──▶ WebSocket
//!                                        │
//!                          EventSink ◀───┘ (Ready / Partial / Final / Error / Closed)
//! ```

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use super::config::AssemblyAISTTConfig;
use super::messages::{AssemblyAIMessage, TerminateMessage};
use crate::core::stream::{EVENT_BUFFER_SIZE, EventSink, EventStream, event_channel};
use crate::core::stt::base::{BaseSTT, STTConfig, STTError, STTEvent};

// =============================================================================
// Constants
// =============================================================================

/// Maximum audio chunk size in bytes. At 48kHz mono 16-bit PCM this is
/// roughly 2.5 seconds of audio.
const MAX_AUDIO_CHUNK_SIZE: usize = 256 * 1024;

/// Per-message idle timeout; resets after every server message.
const WS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// How long `open` waits for the `Begin` message.
const SESSION_BEGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `close` waits for the connection task to wind down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Buffered audio frames between `submit` and the connection task.
const AUDIO_QUEUE_SIZE: usize = 64;

pub const MIN_SAMPLE_RATE: u32 = 8000;
pub const MAX_SAMPLE_RATE: u32 = 48000;

// =============================================================================
// Turn Filtering
// =============================================================================

/// Decides which turn messages become partials, finals or nothing.
///
/// With formatting enabled each end-of-turn arrives twice (raw, then
/// formatted); only the formatted one is final. A turn order or text that
/// was already finalised is never emitted again.
#[derive(Debug, Default)]
pub(crate) struct TurnFilter {
    format_turns: bool,
    last_final_order: Option<u32>,
    last_final_text: Option<String>,
}

impl TurnFilter {
    pub(crate) fn new(format_turns: bool) -> Self {
        Self {
            format_turns,
            ..Default::default()
        }
    }

    fn classify(&mut self, turn_order: u32, text: &str, end_of_turn: bool, formatted: bool) -> Option<STTEvent> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if !end_of_turn || (self.format_turns && !formatted) {
            return Some(STTEvent::Partial {
                text: text.to_string(),
            });
        }

        if self.last_final_order == Some(turn_order)
            || self.last_final_text.as_deref() == Some(text)
        {
            debug!(turn_order, "Suppressing duplicate AssemblyAI final");
            return None;
        }

        self.last_final_order = Some(turn_order);
        self.last_final_text = Some(text.to_string());
        Some(STTEvent::Final {
            text: text.to_string(),
            end_of_turn: true,
        })
    }
}

/// Outcome of handling one server frame.
#[derive(Debug, PartialEq)]
pub(crate) struct Handled {
    pub event: Option<STTEvent>,
    pub keep_open: bool,
}

impl Handled {
    fn open(event: Option<STTEvent>) -> Self {
        Self {
            event,
            keep_open: true,
        }
    }

    fn closed(event: STTEvent) -> Self {
        Self {
            event: Some(event),
            keep_open: false,
        }
    }
}

// =============================================================================
// AssemblyAISTT Client
// =============================================================================

pub struct AssemblyAISTT {
    config: AssemblyAISTTConfig,
    audio_tx: Option<mpsc::Sender<Bytes>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    connection_handle: Option<JoinHandle<()>>,
    is_connected: Arc<AtomicBool>,
}

impl AssemblyAISTT {
    /// Translate a server frame into at most one event.
    pub(crate) fn handle_websocket_message(message: Message, turns: &mut TurnFilter) -> Handled {
        match message {
            Message::Text(text) => match AssemblyAIMessage::parse(&text) {
                Ok(AssemblyAIMessage::Begin(begin)) => {
                    info!(
                        session_id = %begin.id,
                        expires_at = begin.expires_at,
                        "AssemblyAI STT session started"
                    );
                    Handled::open(Some(STTEvent::Ready {
                        session_id: begin.id,
                    }))
                }
                Ok(AssemblyAIMessage::Turn(turn)) => Handled::open(turns.classify(
                    turn.turn_order,
                    &turn.transcript,
                    turn.end_of_turn,
                    turn.turn_is_formatted,
                )),
                Ok(AssemblyAIMessage::Termination(term)) => {
                    info!(
                        audio_duration_ms = term.audio_duration_ms,
                        normal = term.terminated_normally,
                        "AssemblyAI session terminated"
                    );
                    Handled::closed(STTEvent::Closed {
                        audio_duration_ms: Some(term.audio_duration_ms),
                    })
                }
                Ok(AssemblyAIMessage::Error(err)) => {
                    let error = match err.error_code.as_deref() {
                        Some("invalid_api_key") | Some("authentication_failed") => {
                            STTError::AuthenticationFailed(err.error)
                        }
                        Some("invalid_audio") | Some("audio_error") => {
                            STTError::InvalidAudioFormat(err.error)
                        }
                        _ => STTError::ProviderError(err.error),
                    };
                    error!("AssemblyAI STT error: {}", error);
                    Handled::closed(STTEvent::Error {
                        reason: error.to_string(),
                    })
                }
                Ok(AssemblyAIMessage::Unknown(raw)) => {
                    debug!("Received unknown AssemblyAI message type: {}", raw);
                    Handled::open(None)
                }
                Err(e) => {
                    warn!("Failed to parse AssemblyAI message: {}", e);
                    Handled::open(None)
                }
            },
            Message::Close(frame) => {
                info!("AssemblyAI WebSocket closed: {:?}", frame);
                Handled::closed(STTEvent::Closed {
                    audio_duration_ms: None,
                })
            }
            _ => Handled::open(None),
        }
    }

    async fn run_connection<S>(
        ws_stream: S,
        mut audio_rx: mpsc::Receiver<Bytes>,
        mut shutdown_rx: oneshot::Receiver<()>,
        connected_tx: oneshot::Sender<()>,
        sink: EventSink<STTEvent>,
        format_turns: bool,
        is_connected: Arc<AtomicBool>,
    ) where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
            + Unpin,
    {
        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let mut connected_tx = Some(connected_tx);
        let mut turns = TurnFilter::new(format_turns);

        loop {
            tokio::select! {
                Some(audio) = audio_rx.recv() => {
                    let len = audio.len();
                    if let Err(e) = ws_sink.send(Message::Binary(audio)).await {
                        let reason = STTError::NetworkError(format!(
                            "Failed to send audio to AssemblyAI: {e}"
                        ));
                        error!("{}", reason);
                        sink.send(STTEvent::Error { reason: reason.to_string() }).await;
                        break;
                    }
                    debug!("Sent {} bytes of audio to AssemblyAI", len);
                }

                message = timeout(WS_MESSAGE_TIMEOUT, ws_stream.next()) => {
                    match message {
                        Ok(Some(Ok(msg))) => {
                            let handled = Self::handle_websocket_message(msg, &mut turns);
                            if let Some(event) = handled.event {
                                if matches!(event, STTEvent::Ready { .. })
                                    && let Some(tx) = connected_tx.take()
                                {
                                    is_connected.store(true, Ordering::Release);
                                    let _ = tx.send(());
                                }
                                if !sink.send(event).await {
                                    debug!("AssemblyAI event consumer gone");
                                    break;
                                }
                            }
                            if !handled.keep_open {
                                break;
                            }
                        }
                        Ok(Some(Err(e))) => {
                            let reason = STTError::NetworkError(format!("WebSocket error: {e}"));
                            error!("{}", reason);
                            sink.send(STTEvent::Error { reason: reason.to_string() }).await;
                            break;
                        }
                        Ok(None) => {
                            info!("AssemblyAI WebSocket stream ended");
                            sink.send(STTEvent::Closed { audio_duration_ms: None }).await;
                            break;
                        }
                        Err(_elapsed) => {
                            info!("AssemblyAI STT idle for {}s, closing", WS_MESSAGE_TIMEOUT.as_secs());
                            sink.send(STTEvent::Closed { audio_duration_ms: None }).await;
                            break;
                        }
                    }
                }

                _ = &mut shutdown_rx => {
                    info!("Received shutdown signal for AssemblyAI STT");
                    Self::send_terminate(&mut ws_sink).await;
                    break;
                }

                _ = sink.cancelled() => {
                    debug!("AssemblyAI event stream cancelled");
                    Self::send_terminate(&mut ws_sink).await;
                    break;
                }
            }
        }

        is_connected.store(false, Ordering::Release);
        info!("AssemblyAI STT WebSocket connection closed");
    }

    async fn send_terminate<W>(ws_sink: &mut W)
    where
        W: futures::Sink<Message> + Unpin,
    {
        if let Ok(json) = serde_json::to_string(&TerminateMessage::default()) {
            let _ = ws_sink.send(Message::Text(json.into())).await;
        }
        let _ = ws_sink.send(Message::Close(None)).await;
    }
}

impl Drop for AssemblyAISTT {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

// =============================================================================
// BaseSTT Trait Implementation
// =============================================================================

#[async_trait::async_trait]
impl BaseSTT for AssemblyAISTT {
    fn new(config: STTConfig) -> Result<Self, STTError> {
        if config.api_key.is_empty() {
            return Err(STTError::AuthenticationFailed(
                "API key is required for AssemblyAI STT".to_string(),
            ));
        }

        let sample_rate = config.sample_rate;
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(STTError::ConfigurationError(format!(
                "Sample rate {} Hz is outside supported range ({}-{} Hz)",
                sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
            )));
        }

        Ok(Self {
            config: AssemblyAISTTConfig::from_base(config),
            audio_tx: None,
            shutdown_tx: None,
            connection_handle: None,
            is_connected: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn open(&mut self) -> Result<EventStream<STTEvent>, STTError> {
        if self.is_open() {
            self.close().await?;
        }

        let url = self.config.build_websocket_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| STTError::ConnectionFailed(format!("Failed to create WebSocket request: {e}")))?;
        // AssemblyAI expects the raw key, no Bearer prefix
        let auth = HeaderValue::from_str(&self.config.base.api_key)
            .map_err(|e| STTError::ConfigurationError(format!("Invalid API key header: {e}")))?;
        request.headers_mut().insert("Authorization", auth);

        let (ws_stream, _response) = timeout(SESSION_BEGIN_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| STTError::Timeout("Connecting to AssemblyAI".to_string()))?
            .map_err(|e| STTError::ConnectionFailed(format!("Failed to connect to AssemblyAI: {e}")))?;

        info!("Connected to AssemblyAI STT WebSocket");

        let (audio_tx, audio_rx) = mpsc::channel::<Bytes>(AUDIO_QUEUE_SIZE);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (connected_tx, connected_rx) = oneshot::channel::<()>();
        let (sink, stream) = event_channel::<STTEvent>(EVENT_BUFFER_SIZE);

        let handle = tokio::spawn(Self::run_connection(
            ws_stream,
            audio_rx,
            shutdown_rx,
            connected_tx,
            sink,
            self.config.base.format_turns,
            self.is_connected.clone(),
        ));

        self.audio_tx = Some(audio_tx);
        self.shutdown_tx = Some(shutdown_tx);
        self.connection_handle = Some(handle);

        match timeout(SESSION_BEGIN_TIMEOUT, connected_rx).await {
            Ok(Ok(())) => Ok(stream),
            Ok(Err(_)) => {
                self.close().await?;
                Err(STTError::ConnectionFailed(
                    "Connection closed before session started".to_string(),
                ))
            }
            Err(_) => {
                self.close().await?;
                Err(STTError::Timeout(
                    "Waiting for AssemblyAI Begin message".to_string(),
                ))
            }
        }
    }

    async fn submit(&mut self, audio: Bytes) -> Result<(), STTError> {
        let Some(audio_tx) = self.audio_tx.as_ref() else {
            return Err(STTError::NotConnected);
        };

        if audio.len() > MAX_AUDIO_CHUNK_SIZE {
            return Err(STTError::InvalidAudioFormat(format!(
                "Audio chunk size {} bytes exceeds maximum {} bytes",
                audio.len(),
                MAX_AUDIO_CHUNK_SIZE
            )));
        }

        match audio_tx.try_send(audio) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("AssemblyAI audio queue full, dropping frame");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.audio_tx = None;
                Err(STTError::NotConnected)
            }
        }
    }

    async fn close(&mut self) -> Result<(), STTError> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        self.audio_tx = None;

        if let Some(mut handle) = self.connection_handle.take()
            && timeout(CLOSE_TIMEOUT, &mut handle).await.is_err()
        {
            warn!("AssemblyAI connection task did not stop in time, aborting");
            handle.abort();
        }

        self.is_connected.store(false, Ordering::Release);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_connected.load(Ordering::Acquire) && self.audio_tx.is_some()
    }

    fn provider_info(&self) -> &'static str {
        "AssemblyAI Streaming STT v3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(json: &str) -> Message {
        Message::Text(json.into())
    }

    #[test]
    fn test_new_requires_api_key() {
        let result = AssemblyAISTT::new(STTConfig::default());
        assert!(matches!(result, Err(STTError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_new_rejects_sample_rate_out_of_range() {
        let result = AssemblyAISTT::new(STTConfig {
            api_key: "key".to_string(),
            sample_rate: 96000,
            ..Default::default()
        });
        assert!(matches!(result, Err(STTError::ConfigurationError(_))));
    }

    #[tokio::test]
    async fn test_submit_when_not_connected() {
        let mut stt = AssemblyAISTT::new(STTConfig {
            api_key: "key".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert!(!stt.is_open());
        let result = stt.submit(Bytes::from(vec![0u8; 320])).await;
        assert_eq!(result, Err(STTError::NotConnected));
    }

    #[test]
    fn test_handle_begin_message() {
        let mut turns = TurnFilter::new(true);
        let handled = AssemblyAISTT::handle_websocket_message(
            text(r#"{"type":"Begin","id":"sess-1","expires_at":1704067200}"#),
            &mut turns,
        );
        assert!(handled.keep_open);
        assert_eq!(
            handled.event,
            Some(STTEvent::Ready {
                session_id: "sess-1".to_string()
            })
        );
    }

    #[test]
    fn test_interim_and_unformatted_turns_are_partials() {
        let mut turns = TurnFilter::new(true);
        let interim = AssemblyAISTT::handle_websocket_message(
            text(r#"{"type":"Turn","turn_order":0,"transcript":"hello wor","end_of_turn":false}"#),
            &mut turns,
        );
        assert_eq!(
            interim.event,
            Some(STTEvent::Partial {
                text: "hello wor".to_string()
            })
        );

        let raw_final = AssemblyAISTT::handle_websocket_message(
            text(r#"{"type":"Turn","turn_order":0,"transcript":"hello world","end_of_turn":true,"turn_is_formatted":false}"#),
            &mut turns,
        );
        assert!(matches!(raw_final.event, Some(STTEvent::Partial { .. })));
    }

    #[test]
    fn test_formatted_final_is_emitted_once() {
        let mut turns = TurnFilter::new(true);
        let json = r#"{"type":"Turn","turn_order":3,"transcript":"Hello world.","end_of_turn":true,"turn_is_formatted":true}"#;

        let first = AssemblyAISTT::handle_websocket_message(text(json), &mut turns);
        assert_eq!(
            first.event,
            Some(STTEvent::Final {
                text: "Hello world.".to_string(),
                end_of_turn: true
            })
        );

        let repeat = AssemblyAISTT::handle_websocket_message(text(json), &mut turns);
        assert_eq!(repeat.event, None);
        assert!(repeat.keep_open);
    }

    #[test]
    fn test_unformatted_mode_finalises_immediately() {
        let mut turns = TurnFilter::new(false);
        let handled = AssemblyAISTT::handle_websocket_message(
            text(r#"{"type":"Turn","turn_order":0,"transcript":"hi","end_of_turn":true}"#),
            &mut turns,
        );
        assert!(matches!(handled.event, Some(STTEvent::Final { .. })));
    }

    #[test]
    fn test_empty_transcript_is_ignored() {
        let mut turns = TurnFilter::new(true);
        let handled = AssemblyAISTT::handle_websocket_message(
            text(r#"{"type":"Turn","turn_order":0,"transcript":"  ","end_of_turn":false}"#),
            &mut turns,
        );
        assert_eq!(handled.event, None);
    }

    #[test]
    fn test_termination_closes_with_duration() {
        let mut turns = TurnFilter::new(true);
        let handled = AssemblyAISTT::handle_websocket_message(
            text(r#"{"type":"Termination","audio_duration_ms":5000,"terminated_normally":true}"#),
            &mut turns,
        );
        assert!(!handled.keep_open);
        assert_eq!(
            handled.event,
            Some(STTEvent::Closed {
                audio_duration_ms: Some(5000)
            })
        );
    }

    #[test]
    fn test_error_message_becomes_error_event() {
        let mut turns = TurnFilter::new(true);
        let handled = AssemblyAISTT::handle_websocket_message(
            text(r#"{"type":"Error","error_code":"invalid_api_key","error":"API key is invalid"}"#),
            &mut turns,
        );
        assert!(!handled.keep_open);
        match handled.event {
            Some(STTEvent::Error { reason }) => {
                assert!(reason.contains("Authentication failed"));
                assert!(reason.contains("API key is invalid"));
            }
            other => panic!("Expected error event, got {other:?}"),
        }
    }

    #[test]
    fn test_close_frame_closes_stream() {
        let mut turns = TurnFilter::new(true);
        let handled = AssemblyAISTT::handle_websocket_message(Message::Close(None), &mut turns);
        assert!(!handled.keep_open);
        assert!(matches!(handled.event, Some(STTEvent::Closed { .. })));
    }
}
