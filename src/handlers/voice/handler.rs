//! Voice stream WebSocket handler
//!
//! Binary frames carry microphone audio; text frames carry `stop` and echo
//! requests. Everything the turn coordinator emits is forwarded to the
//! client as JSON text frames in emission order.

use axum::{
    Extension,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::{select, time::Duration};
use tracing::{debug, error, info, warn};

use crate::core::audio::InputTranscoder;
use crate::core::session::{Capability, Session, SessionLease};
use crate::core::turn::{SubmitError, TurnCoordinator, TurnEvent, TurnHandle};
use crate::middleware::ClientIp;
use crate::state::AppState;

use super::messages::{ClientText, MessageRoute, OutgoingMessage, StreamParams, parse_client_text};
use super::providers::ProviderKeys;

/// Channel buffer between the socket reader and the sender task
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Largest accepted audio frame
const MAX_AUDIO_FRAME_BYTES: usize = 256 * 1024;

/// Capture rate assumed when the client does not send `sample_rate`
const DEFAULT_CLIENT_SAMPLE_RATE: u32 = 16_000;

/// Time the coordinator gets to close its provider streams on disconnect
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// How long a reconnecting client waits for the previous connection to let
/// go of the session
const SESSION_HANDOVER_WAIT: Duration = Duration::from_secs(5);

const MISSING_STT_KEY: &str = "Missing AssemblyAI API key. Please configure it in settings.";

/// Voice stream WebSocket handler
///
/// # Arguments
/// * `ws` - The WebSocket upgrade request from Axum
/// * `state` - Application state
/// * `params` - Session id, per-session keys, persona and audio format
/// * `client_ip` - Slot owner recorded by the connection limit middleware
pub async fn ws_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
    client_ip: Option<Extension<ClientIp>>,
) -> Response {
    let client_ip = client_ip.map(|Extension(ip)| ip);
    info!(?params, "Voice stream connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_voice_socket(socket, state, params, client_ip))
}

/// Per-connection runtime built during the handshake.
struct ActiveStream {
    session: Arc<Session>,
    lease: SessionLease,
    handle: TurnHandle,
    transcoder: InputTranscoder,
    forwarder: tokio::task::JoinHandle<()>,
}

async fn handle_voice_socket(
    socket: WebSocket,
    app_state: Arc<AppState>,
    mut params: StreamParams,
    client_ip: Option<ClientIp>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);

    let sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let should_close = matches!(route, MessageRoute::Close);

            let result = match route {
                MessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                MessageRoute::Close => {
                    debug!("Closing voice stream WebSocket");
                    sender.send(Message::Close(None)).await
                }
            };

            if let Err(e) = result {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    let _ = message_tx
        .send(MessageRoute::Outgoing(OutgoingMessage::info(
            "Connected successfully",
        )))
        .await;

    let stream = match open_stream(&app_state, &mut params, &message_tx).await {
        Some(stream) => stream,
        None => {
            let _ = message_tx.send(MessageRoute::Close).await;
            let _ = sender_task.await;
            if let Some(ClientIp(ip)) = client_ip {
                app_state.release_connection(ip);
            }
            return;
        }
    };

    let ActiveStream {
        session,
        lease,
        handle,
        transcoder,
        forwarder,
    } = stream;
    info!(session_id = %session.id(), "Voice stream established");

    // How often we check if the connection is stale
    let processing_timeout = Duration::from_secs(30);

    // Idle limit of 5 minutes with ±10% jitter so that stale connections do
    // not all expire together
    let base_idle_secs: u64 = 300;
    let jitter_range: u64 = 30;
    let jitter_offset =
        (uuid::Uuid::new_v4().as_u128() % (jitter_range as u128 * 2)) as i64 - jitter_range as i64;
    let idle_timeout = Duration::from_secs((base_idle_secs as i64 + jitter_offset).max(1) as u64);

    let mut last_activity = std::time::Instant::now();

    loop {
        select! {
            msg_result = receiver.next() => {
                last_activity = std::time::Instant::now();

                match msg_result {
                    Some(Ok(msg)) => {
                        let keep_going = process_message(
                            msg,
                            &session,
                            &handle,
                            &transcoder,
                            &message_tx,
                        ).await;
                        if !keep_going {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %session.id(), "Voice stream WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(session_id = %session.id(), "Voice stream closed by client");
                        break;
                    }
                }
            }
            _ = lease.superseded() => {
                info!(session_id = %session.id(), "Session claimed by a newer connection");
                let _ = message_tx
                    .send(MessageRoute::Outgoing(OutgoingMessage::info(
                        "Session resumed by another connection",
                    )))
                    .await;
                break;
            }
            _ = tokio::time::sleep(processing_timeout) => {
                if last_activity.elapsed() > idle_timeout {
                    warn!(
                        session_id = %session.id(),
                        "Voice stream idle for {}s, closing stale connection",
                        last_activity.elapsed().as_secs()
                    );
                    let _ = message_tx
                        .send(MessageRoute::Outgoing(OutgoingMessage::error(
                            "Connection closed due to inactivity",
                        )))
                        .await;
                    break;
                }
                if handle.is_finished() {
                    warn!(session_id = %session.id(), "Turn coordinator exited, closing stream");
                    break;
                }
            }
        }
    }

    // Cleanup
    handle.shutdown(SHUTDOWN_GRACE).await;
    if let Err(e) = forwarder.await {
        debug!("Event forwarder ended abnormally: {}", e);
    }
    session.detach();
    drop(lease);

    let _ = message_tx.send(MessageRoute::Close).await;
    drop(message_tx);
    if tokio::time::timeout(SHUTDOWN_GRACE, sender_task).await.is_err() {
        debug!("Sender task did not finish in time");
    }

    if let Some(ClientIp(ip)) = client_ip {
        app_state.release_connection(ip);
    }

    info!(session_id = %session.id(), "Voice stream terminated");
}

/// Bind the connection to its session, resolve keys and start the turn
/// coordinator. Returns `None` after reporting the reason to the client.
async fn open_stream(
    app_state: &Arc<AppState>,
    params: &mut StreamParams,
    message_tx: &mpsc::Sender<MessageRoute>,
) -> Option<ActiveStream> {
    let send = |message: OutgoingMessage| {
        let tx = message_tx.clone();
        async move {
            let _ = tx.send(MessageRoute::Outgoing(message)).await;
        }
    };

    let session_id = params.session_id();
    let session = match app_state.sessions.get_or_create(&session_id) {
        Ok(session) => session,
        Err(e) => {
            warn!("Rejecting voice stream: {}", e);
            send(OutgoingMessage::error(e.to_string())).await;
            return None;
        }
    };
    let lease = match session.claim(SESSION_HANDOVER_WAIT).await {
        Ok(lease) => lease,
        Err(e) => {
            warn!(session_id = %session_id, "Rejecting voice stream: {}", e);
            send(OutgoingMessage::error(e.to_string())).await;
            return None;
        }
    };
    session.attach();

    if let Some(name) = params.persona.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        match app_state.sessions.personas().get(name) {
            Some(persona) => session.set_persona(persona),
            None => {
                send(OutgoingMessage::error(format!(
                    "Unknown persona '{name}', keeping '{}'",
                    session.persona().name
                )))
                .await;
            }
        }
    }

    let credentials = params.take_credentials();
    let config = &app_state.config;
    let resolve = |capability: Capability| {
        config
            .resolve_api_key(capability, credentials.get(capability))
            .ok()
    };

    let stt_key = match resolve(Capability::Stt) {
        Some(key) => key,
        None => {
            warn!(session_id = %session_id, "No speech recognition key available");
            send(OutgoingMessage::error(MISSING_STT_KEY)).await;
            session.detach();
            return None;
        }
    };
    let keys = ProviderKeys {
        stt: stt_key,
        llm: resolve(Capability::Llm),
        tts: resolve(Capability::Tts),
        news: resolve(Capability::News),
        weather: resolve(Capability::Weather),
    };
    session.set_credentials(credentials);

    if keys.llm.is_none() {
        send(OutgoingMessage::info(
            "No Gemini API key configured; assistant replies are disabled",
        ))
        .await;
    }
    if keys.tts.is_none() {
        send(OutgoingMessage::info(
            "No Murf API key configured; replies will be text only",
        ))
        .await;
    }

    let transcoder = match params.encoding().and_then(|encoding| {
        InputTranscoder::new(
            encoding,
            params.sample_rate.unwrap_or(DEFAULT_CLIENT_SAMPLE_RATE),
            config.stt_sample_rate,
        )
    }) {
        Ok(transcoder) => transcoder,
        Err(e) => {
            send(OutgoingMessage::error(format!("Unsupported audio format: {e}"))).await;
            session.detach();
            return None;
        }
    };

    let capabilities = match app_state.providers.build(config, &keys) {
        Ok(capabilities) => capabilities,
        Err(e) => {
            error!(session_id = %session_id, "Failed to build providers: {}", e);
            send(OutgoingMessage::error(e)).await;
            session.detach();
            return None;
        }
    };

    let (event_tx, mut event_rx) = mpsc::channel::<TurnEvent>(CHANNEL_BUFFER_SIZE);
    let handle = TurnCoordinator::spawn(
        session.clone(),
        capabilities,
        config.turn_config(),
        event_tx,
    );

    let forward_tx = message_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if forward_tx
                .send(MessageRoute::Outgoing(event.into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    Some(ActiveStream {
        session,
        lease,
        handle,
        transcoder,
        forwarder,
    })
}

/// Handle one client frame. Returns `false` when the connection should end.
async fn process_message(
    msg: Message,
    session: &Session,
    handle: &TurnHandle,
    transcoder: &InputTranscoder,
    message_tx: &mpsc::Sender<MessageRoute>,
) -> bool {
    match msg {
        Message::Binary(data) => {
            session.touch();
            if data.len() > MAX_AUDIO_FRAME_BYTES {
                warn!(
                    session_id = %session.id(),
                    "Dropping oversized audio frame: {} bytes", data.len()
                );
                let _ = message_tx
                    .send(MessageRoute::Outgoing(OutgoingMessage::error(format!(
                        "Audio frame too large: {} bytes (max {MAX_AUDIO_FRAME_BYTES})",
                        data.len()
                    ))))
                    .await;
                return true;
            }
            submit_audio(data, session, handle, transcoder, message_tx).await
        }
        Message::Text(text) => {
            session.touch();
            match parse_client_text(&text) {
                ClientText::Stop => {
                    debug!(session_id = %session.id(), "Stop requested");
                    handle.stop().is_ok()
                }
                ClientText::Echo(text) => {
                    let _ = message_tx
                        .send(MessageRoute::Outgoing(OutgoingMessage::echo(text)))
                        .await;
                    true
                }
            }
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            info!(session_id = %session.id(), "Voice stream close received");
            false
        }
    }
}

async fn submit_audio(
    data: Bytes,
    session: &Session,
    handle: &TurnHandle,
    transcoder: &InputTranscoder,
    message_tx: &mpsc::Sender<MessageRoute>,
) -> bool {
    let audio = match transcoder.transcode(data) {
        Ok(audio) => audio,
        Err(e) => {
            debug!(session_id = %session.id(), "Dropping malformed audio frame: {}", e);
            let _ = message_tx
                .send(MessageRoute::Outgoing(OutgoingMessage::error(format!(
                    "Invalid audio frame: {e}"
                ))))
                .await;
            return true;
        }
    };
    if audio.is_empty() {
        return true;
    }

    match handle.submit_audio(audio) {
        Ok(()) => true,
        Err(SubmitError::QueueFull) => {
            warn!(session_id = %session.id(), "Audio queue full, dropping frame");
            true
        }
        Err(SubmitError::Closed) => false,
    }
}
