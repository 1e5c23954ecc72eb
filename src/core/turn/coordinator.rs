//! Per-session turn coordinator.
//!
//! One task per session owns the speech-to-text adapter and multiplexes four
//! inputs: client commands, recognizer events, generation events and
//! synthesis events. Only one turn may hold the generation/synthesis slot at
//! a time; end-of-turn transcripts that arrive while a turn is in flight are
//! queued and started in arrival order once the slot frees up.
//!
//! Provider setup (opening the recognizer, starting a generation or a
//! synthesis call) is never awaited inline. Each setup is parked as a pending
//! future that the main loop polls next to the command channels, so stop
//! requests and audio keep flowing while a provider is slow to answer.

use bytes::Bytes;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::TurnEvent;
use super::state::TurnState;
use crate::core::audio::{
    ChunkSequencer, DEFAULT_JITTER_BUFFER, PlaybackScheduler, decode_pcm16, strip_wav_header,
};
use crate::core::llm::{BaseLLM, GenerationRequest, LLMEvent, LLMResult, Role};
use crate::core::retry::RetryPolicy;
use crate::core::session::Session;
use crate::core::stream::EventStream;
use crate::core::stt::{BaseSTT, STTError, STTEvent, STTResult};
use crate::core::tts::{BaseTTS, TTSEvent, TTSResult};

pub const DEFAULT_AUDIO_QUEUE_SIZE: usize = 64;

type Pending<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Recognizer handed back by an open attempt. `None` means the attempt was
/// cancelled before the provider answered.
type SttOpening = Pending<(Box<dyn BaseSTT>, Option<STTResult<EventStream<STTEvent>>>)>;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Generate and speak a reply for every end-of-turn transcript
    pub auto_reply: bool,
    /// Longest wait for recognizer progress while capturing speech
    pub stt_timeout: Duration,
    /// Ceiling for one generation call, from request to end of stream
    pub llm_timeout: Duration,
    /// Ceiling for one synthesis call, from request to completion
    pub tts_timeout: Duration,
    /// Record partial assistant text in history when generation times out
    pub keep_partial_on_timeout: bool,
    /// Playback delay before the first chunk of each reply
    pub jitter_buffer: Duration,
    /// Backoff for (re)opening the recognizer stream
    pub stt_retry: RetryPolicy,
    /// Inbound audio frames buffered ahead of the coordinator
    pub audio_queue_size: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            auto_reply: true,
            stt_timeout: Duration::from_secs(18),
            llm_timeout: Duration::from_secs(20),
            tts_timeout: Duration::from_secs(25),
            keep_partial_on_timeout: false,
            jitter_buffer: DEFAULT_JITTER_BUFFER,
            stt_retry: RetryPolicy::default(),
            audio_queue_size: DEFAULT_AUDIO_QUEUE_SIZE,
        }
    }
}

/// Provider adapters bound to one session. Missing generation or synthesis
/// disables that stage only.
pub struct TurnCapabilities {
    pub stt: Box<dyn BaseSTT>,
    pub llm: Option<Arc<dyn BaseLLM>>,
    pub tts: Option<Arc<dyn BaseTTS>>,
}

// =============================================================================
// Handle
// =============================================================================

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Audio queue is full")]
    QueueFull,

    #[error("Turn coordinator has stopped")]
    Closed,
}

/// Control side of a running coordinator.
///
/// Stop requests travel on their own single-slot channel, so a full audio
/// queue never delays them.
pub struct TurnHandle {
    audio: mpsc::Sender<Bytes>,
    stop: mpsc::Sender<()>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TurnHandle {
    /// Queue an audio frame without waiting. Full queues drop the frame.
    pub fn submit_audio(&self, audio: Bytes) -> Result<(), SubmitError> {
        self.audio.try_send(audio).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }

    /// Abort the current turn and close provider streams. Requests made while
    /// one is already queued collapse into it.
    pub fn stop(&self) -> Result<(), SubmitError> {
        match self.stop.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(())) => Err(SubmitError::Closed),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the coordinator, waiting up to `grace` before aborting it.
    pub async fn shutdown(self, grace: Duration) {
        self.cancel.cancel();
        let mut task = self.task;
        if timeout(grace, &mut task).await.is_err() {
            warn!("Turn coordinator did not stop within {:?}, aborting", grace);
            task.abort();
        }
    }
}

// =============================================================================
// Coordinator
// =============================================================================

pub struct TurnCoordinator {
    session: Arc<Session>,
    config: TurnConfig,
    /// Absent while an open attempt owns the recognizer
    stt: Option<Box<dyn BaseSTT>>,
    llm: Option<Arc<dyn BaseLLM>>,
    tts: Option<Arc<dyn BaseTTS>>,
    events: mpsc::Sender<TurnEvent>,
    state: TurnState,

    stt_stream: Option<EventStream<STTEvent>>,
    stt_opening: Option<SttOpening>,
    stt_open_cancel: CancellationToken,
    /// Frames received while the recognizer is opening
    stt_backlog: VecDeque<Bytes>,
    stt_deadline: Option<Instant>,
    stt_failures: u32,
    stt_retry_at: Option<Instant>,
    stt_gave_up: bool,
    pending_turns: VecDeque<String>,

    llm_setup: Option<Pending<LLMResult<EventStream<LLMEvent>>>>,
    llm_stream: Option<EventStream<LLMEvent>>,
    llm_deadline: Option<Instant>,
    response: String,
    fragments: usize,
    /// Session reset epoch when the current turn started
    turn_epoch: u64,

    tts_setup: Option<Pending<TTSResult<EventStream<TTSEvent>>>>,
    tts_stream: Option<EventStream<TTSEvent>>,
    tts_deadline: Option<Instant>,
    tts_sample_rate: u32,
    sequencer: Option<ChunkSequencer>,
    scheduler: PlaybackScheduler,
}

impl TurnCoordinator {
    /// Start the coordinator task for `session`. Client events are delivered
    /// on `events` in order.
    pub fn spawn(
        session: Arc<Session>,
        capabilities: TurnCapabilities,
        config: TurnConfig,
        events: mpsc::Sender<TurnEvent>,
    ) -> TurnHandle {
        let (audio_tx, audio_rx) = mpsc::channel(config.audio_queue_size.max(1));
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let coordinator = Self {
            session,
            scheduler: PlaybackScheduler::new(config.jitter_buffer),
            config,
            stt: Some(capabilities.stt),
            llm: capabilities.llm,
            tts: capabilities.tts,
            events,
            state: TurnState::Idle,
            stt_stream: None,
            stt_opening: None,
            stt_open_cancel: CancellationToken::new(),
            stt_backlog: VecDeque::new(),
            stt_deadline: None,
            stt_failures: 0,
            stt_retry_at: None,
            stt_gave_up: false,
            pending_turns: VecDeque::new(),
            llm_setup: None,
            llm_stream: None,
            llm_deadline: None,
            response: String::new(),
            fragments: 0,
            turn_epoch: 0,
            tts_setup: None,
            tts_stream: None,
            tts_deadline: None,
            tts_sample_rate: 0,
            sequencer: None,
        };

        let task = tokio::spawn(coordinator.run(audio_rx, stop_rx, cancel.clone()));
        TurnHandle {
            audio: audio_tx,
            stop: stop_tx,
            cancel,
            task,
        }
    }

    async fn run(
        mut self,
        mut audio: mpsc::Receiver<Bytes>,
        mut stop: mpsc::Receiver<()>,
        cancel: CancellationToken,
    ) {
        info!(session_id = %self.session.id(), "Turn coordinator started");
        let mut resets = self.session.subscribe_resets();

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(()) = stop.recv() => {
                    // Frames queued ahead of the stop belong to the abandoned capture
                    while audio.try_recv().is_ok() {}
                    self.on_stop().await
                }
                frame = audio.recv() => match frame {
                    Some(frame) => self.on_audio(frame).await,
                    None => break,
                },
                Ok(()) = resets.changed() => self.on_reset().await,
                opened = settle(&mut self.stt_opening) => self.on_stt_opened(opened).await,
                result = settle(&mut self.llm_setup) => self.on_generation_ready(result).await,
                result = settle(&mut self.tts_setup) => self.on_synthesis_ready(result).await,
                event = next_event(&mut self.stt_stream) => self.on_stt_event(event).await,
                event = next_event(&mut self.llm_stream) => self.on_llm_event(event).await,
                event = next_event(&mut self.tts_stream) => self.on_tts_event(event).await,
                _ = sleep_until_deadline(deadline) => self.on_deadline().await,
            }
            self.start_pending_turns().await;
        }

        self.reclaim_recognizer().await;
        self.release_streams().await;
        info!(session_id = %self.session.id(), "Turn coordinator stopped");
    }

    // -------------------------------------------------------------------------
    // Client commands
    // -------------------------------------------------------------------------

    async fn on_audio(&mut self, audio: Bytes) {
        if self.stt_stream.is_some() {
            self.submit_to_stt(audio).await;
        } else if self.begin_stt_open() {
            self.buffer_audio(audio);
        }
    }

    async fn on_stop(&mut self) {
        info!(session_id = %self.session.id(), state = %self.state, "Stop requested");
        self.pending_turns.clear();
        self.stt_open_cancel.cancel();
        self.stt_backlog.clear();
        self.release_streams().await;
        self.stt_failures = 0;
        self.stt_retry_at = None;
        self.stt_gave_up = false;
        self.emit(TurnEvent::info("Stopped")).await;
    }

    /// Abandon the current turn after the session history was cleared
    /// elsewhere. The recognizer stays open.
    async fn on_reset(&mut self) {
        info!(session_id = %self.session.id(), state = %self.state, "Session reset");
        self.pending_turns.clear();
        self.stt_deadline = None;
        self.finish_turn();
        self.emit(TurnEvent::info("Session reset")).await;
    }

    async fn submit_to_stt(&mut self, audio: Bytes) -> bool {
        let Some(stt) = self.stt.as_mut() else {
            return false;
        };

        match stt.submit(audio).await {
            Ok(()) => {}
            Err(STTError::NotConnected) => {
                debug!(session_id = %self.session.id(), "Recognizer gone, reopening on next frame");
                self.stt_stream = None;
                return false;
            }
            Err(e) => {
                warn!(session_id = %self.session.id(), "Failed to submit audio: {}", e);
                self.emit(TurnEvent::error(format!("Speech recognition error: {e}")))
                    .await;
                return false;
            }
        }

        if self.state == TurnState::Idle {
            self.set_state(TurnState::Listening);
            self.stt_deadline = Some(Instant::now() + self.config.stt_timeout);
        }
        true
    }

    /// Keep at most one audio queue worth of frames, oldest dropped first.
    fn buffer_audio(&mut self, audio: Bytes) {
        if self.stt_backlog.len() >= self.config.audio_queue_size.max(1) {
            self.stt_backlog.pop_front();
        }
        self.stt_backlog.push_back(audio);
    }

    /// Start opening the recognizer unless an attempt is already running.
    /// Returns false while backing off or after retries are exhausted; the
    /// caller drops its audio.
    fn begin_stt_open(&mut self) -> bool {
        if self.stt_opening.is_some() {
            return true;
        }
        if self.stt_gave_up || self.stt_retry_at.is_some_and(|at| Instant::now() < at) {
            return false;
        }
        let Some(mut stt) = self.stt.take() else {
            return false;
        };

        let cancel = CancellationToken::new();
        self.stt_open_cancel = cancel.clone();
        self.stt_opening = Some(Box::pin(async move {
            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                opened = stt.open() => Some(opened),
            };
            if opened.is_none() {
                let _ = stt.close().await;
            }
            (stt, opened)
        }));
        true
    }

    async fn on_stt_opened(
        &mut self,
        (stt, opened): (Box<dyn BaseSTT>, Option<STTResult<EventStream<STTEvent>>>),
    ) {
        let provider = stt.provider_info();
        self.stt = Some(stt);

        match opened {
            Some(Ok(stream)) => {
                info!(session_id = %self.session.id(), provider, "Recognizer opened");
                self.stt_stream = Some(stream);
                self.stt_failures = 0;
                self.stt_retry_at = None;
                let backlog = std::mem::take(&mut self.stt_backlog);
                for frame in backlog {
                    if !self.submit_to_stt(frame).await {
                        break;
                    }
                }
            }
            Some(Err(e)) => {
                self.stt_backlog.clear();
                self.stt_failures += 1;
                if self.config.stt_retry.should_retry(self.stt_failures) {
                    let delay = self.config.stt_retry.delay(self.stt_failures);
                    warn!(
                        session_id = %self.session.id(),
                        attempt = self.stt_failures,
                        "Recognizer open failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    self.stt_retry_at = Some(Instant::now() + delay);
                } else {
                    error!(
                        session_id = %self.session.id(),
                        attempts = self.stt_failures,
                        "Recognizer open failed, giving up: {}",
                        e
                    );
                    self.stt_gave_up = true;
                    self.emit(TurnEvent::error(format!(
                        "Speech recognition unavailable after {} attempts: {e}",
                        self.stt_failures
                    )))
                    .await;
                }
            }
            None => {
                debug!(session_id = %self.session.id(), "Recognizer open cancelled");
                // Audio that arrived after the cancel starts a fresh attempt
                if !self.stt_backlog.is_empty() && !self.begin_stt_open() {
                    self.stt_backlog.clear();
                }
            }
        }
    }

    /// Wait out an open attempt so the recognizer can be closed on exit.
    async fn reclaim_recognizer(&mut self) {
        self.stt_open_cancel.cancel();
        if let Some(opening) = self.stt_opening.take() {
            let (stt, _) = opening.await;
            self.stt = Some(stt);
        }
    }

    // -------------------------------------------------------------------------
    // Recognition
    // -------------------------------------------------------------------------

    async fn on_stt_event(&mut self, event: Option<STTEvent>) {
        let Some(event) = event else {
            debug!(session_id = %self.session.id(), "Recognizer stream ended");
            self.close_stt().await;
            return;
        };

        match event {
            STTEvent::Ready { session_id } => {
                debug!(session_id = %self.session.id(), provider_session = %session_id, "Recognizer ready");
                self.emit(TurnEvent::info("AssemblyAI session started")).await;
            }
            STTEvent::Partial { text } => {
                if self.state == TurnState::Idle || self.state.is_capturing() {
                    self.set_state(TurnState::Transcribing);
                    self.stt_deadline = Some(Instant::now() + self.config.stt_timeout);
                }
                self.emit(TurnEvent::Partial { text }).await;
            }
            STTEvent::Final {
                text,
                end_of_turn: false,
            } => {
                self.emit(TurnEvent::Transcript {
                    text,
                    end_of_turn: false,
                })
                .await;
            }
            STTEvent::Final {
                text,
                end_of_turn: true,
            } => self.on_end_of_turn(text).await,
            STTEvent::Error { reason } => {
                warn!(session_id = %self.session.id(), "Recognizer error: {}", reason);
                self.close_stt().await;
                self.emit(TurnEvent::error(format!("Speech recognition error: {reason}")))
                    .await;
            }
            STTEvent::Closed { audio_duration_ms } => {
                self.close_stt().await;
                if let Some(ms) = audio_duration_ms {
                    self.emit(TurnEvent::Info {
                        message: "Session terminated".to_string(),
                        duration: Some(ms as f64 / 1000.0),
                    })
                    .await;
                }
            }
        }
    }

    /// Release the recognizer after it ended on its own. Speech being
    /// captured is abandoned; a turn already in flight is unaffected.
    async fn close_stt(&mut self) {
        self.stt_stream = None;
        if let Some(stt) = self.stt.as_mut()
            && let Err(e) = stt.close().await
        {
            debug!(session_id = %self.session.id(), "Recognizer close failed: {}", e);
        }
        if self.state.is_capturing() {
            self.stt_deadline = None;
            self.set_state(TurnState::Idle);
        }
    }

    async fn on_end_of_turn(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }

        if !self.config.auto_reply {
            self.emit(TurnEvent::Transcript {
                text,
                end_of_turn: true,
            })
            .await;
            if self.state.is_capturing() {
                self.stt_deadline = None;
                self.set_state(TurnState::Idle);
            }
            return;
        }

        if self.state.is_turn_in_flight() {
            debug!(
                session_id = %self.session.id(),
                queued = self.pending_turns.len() + 1,
                "Turn in flight, deferring transcript"
            );
            self.stt_deadline = None;
            self.pending_turns.push_back(text);
            return;
        }

        self.start_turn(text).await;
    }

    async fn start_pending_turns(&mut self) {
        while !self.state.is_turn_in_flight() {
            let Some(text) = self.pending_turns.pop_front() else {
                break;
            };
            self.start_turn(text).await;
        }
    }

    // -------------------------------------------------------------------------
    // Generation
    // -------------------------------------------------------------------------

    async fn start_turn(&mut self, text: String) {
        self.stt_deadline = None;
        self.emit(TurnEvent::Transcript {
            text: text.clone(),
            end_of_turn: true,
        })
        .await;
        self.emit(TurnEvent::TurnEnd).await;

        self.turn_epoch = self.session.reset_epoch();
        let history = self.session.history();
        self.session.append_history(Role::User, text.clone());
        self.response.clear();
        self.fragments = 0;
        self.set_state(TurnState::AwaitingEndOfTurn);

        let Some(llm) = self.llm.clone() else {
            debug!(session_id = %self.session.id(), "Generation disabled, turn ends at transcript");
            self.finish_turn();
            return;
        };

        let request = GenerationRequest {
            prompt: text,
            history,
            persona: Some(self.session.persona().prompt),
        };

        self.llm_deadline = Some(Instant::now() + self.config.llm_timeout);
        self.llm_setup = Some(Box::pin(async move { llm.generate(request).await }));
    }

    async fn on_generation_ready(&mut self, result: LLMResult<EventStream<LLMEvent>>) {
        match result {
            Ok(stream) => self.llm_stream = Some(stream),
            Err(e) => self.fail_generation(&e.to_string()).await,
        }
    }

    async fn on_llm_event(&mut self, event: Option<LLMEvent>) {
        let Some(event) = event else {
            self.fail_generation("generation stream ended unexpectedly")
                .await;
            return;
        };

        match event {
            LLMEvent::Fragment(text) => {
                if self.state == TurnState::AwaitingEndOfTurn {
                    self.set_state(TurnState::Generating);
                }
                self.response.push_str(&text);
                self.fragments += 1;
                self.emit(TurnEvent::LlmChunk { text }).await;
            }
            LLMEvent::Lookup(report) => {
                self.emit(report.into()).await;
            }
            LLMEvent::End => {
                self.llm_stream = None;
                self.llm_deadline = None;
                let text = std::mem::take(&mut self.response);
                debug!(
                    session_id = %self.session.id(),
                    fragments = self.fragments,
                    chars = text.len(),
                    "Generation complete"
                );
                self.emit(TurnEvent::LlmResponse { text: text.clone() })
                    .await;
                if !text.trim().is_empty() && self.turn_is_current() {
                    self.session.append_history(Role::Assistant, text.clone());
                }
                self.start_synthesis(text).await;
            }
            LLMEvent::Error(reason) => self.fail_generation(&reason).await,
        }
    }

    async fn fail_generation(&mut self, reason: &str) {
        error!(session_id = %self.session.id(), "Generation failed: {}", reason);
        self.emit(TurnEvent::error(format!("Processing error: {reason}")))
            .await;
        self.finish_turn();
    }

    async fn on_llm_timeout(&mut self) {
        warn!(
            session_id = %self.session.id(),
            fragments = self.fragments,
            "Generation timed out"
        );
        self.llm_setup = None;
        self.llm_stream = None;
        self.llm_deadline = None;
        if self.config.keep_partial_on_timeout
            && self.fragments > 0
            && !self.response.trim().is_empty()
            && self.turn_is_current()
        {
            let partial = std::mem::take(&mut self.response);
            self.session.append_history(Role::Assistant, partial);
        }
        self.emit(TurnEvent::error(format!(
            "Language generation timed out after {}s",
            self.config.llm_timeout.as_secs()
        )))
        .await;
        self.finish_turn();
    }

    // -------------------------------------------------------------------------
    // Synthesis
    // -------------------------------------------------------------------------

    async fn start_synthesis(&mut self, text: String) {
        let Some(tts) = self.tts.clone() else {
            self.finish_turn();
            return;
        };

        let context_id = Uuid::new_v4().to_string();
        if text.trim().is_empty() {
            self.emit(TurnEvent::AudioComplete {
                context_id,
                total_chunks: 0,
                message: "Nothing to synthesize".to_string(),
            })
            .await;
            self.finish_turn();
            return;
        }

        self.set_state(TurnState::Synthesizing);
        self.emit(TurnEvent::AudioStart {
            context_id: context_id.clone(),
            message: "Starting audio generation...".to_string(),
        })
        .await;

        self.sequencer = Some(ChunkSequencer::new(context_id.clone()));
        self.tts_deadline = Some(Instant::now() + self.config.tts_timeout);
        self.tts_sample_rate = tts.sample_rate();
        self.scheduler.reset();
        self.tts_setup = Some(Box::pin(async move {
            tts.synthesize(&text, &context_id).await
        }));
    }

    async fn on_synthesis_ready(&mut self, result: TTSResult<EventStream<TTSEvent>>) {
        match result {
            Ok(stream) => self.tts_stream = Some(stream),
            Err(e) => {
                self.fail_synthesis(format!("Audio generation failed: {e}"))
                    .await
            }
        }
    }

    async fn on_tts_event(&mut self, event: Option<TTSEvent>) {
        let Some(event) = event else {
            self.fail_synthesis("Audio generation failed: synthesis stream ended unexpectedly".to_string())
                .await;
            return;
        };

        match event {
            TTSEvent::Chunk { audio, is_final } => {
                let samples = decode_pcm16(strip_wav_header(&audio));
                let start = self.scheduler.schedule_chunk(&samples, self.tts_sample_rate);
                let play_at_ms = (start * 1000.0).round().max(0.0) as u64;

                let Some(sequencer) = self.sequencer.as_mut() else {
                    warn!(session_id = %self.session.id(), "Audio chunk outside a synthesis context");
                    return;
                };
                let envelope = sequencer.next_envelope(&audio, is_final, Some(play_at_ms));
                self.emit(TurnEvent::AudioChunk(envelope)).await;
            }
            TTSEvent::Complete => {
                let (context_id, total_chunks) = self
                    .sequencer
                    .as_ref()
                    .map(|s| (s.context_id().to_string(), s.total()))
                    .unwrap_or_default();
                info!(
                    session_id = %self.session.id(),
                    context_id = %context_id,
                    total_chunks,
                    "Synthesis complete"
                );
                self.emit(TurnEvent::AudioComplete {
                    context_id,
                    total_chunks,
                    message: format!("Audio generation complete with {total_chunks} chunks"),
                })
                .await;
                self.finish_turn();
            }
            TTSEvent::Error(reason) => {
                self.fail_synthesis(format!("Audio generation failed: {reason}"))
                    .await
            }
        }
    }

    async fn fail_synthesis(&mut self, message: String) {
        error!(session_id = %self.session.id(), "{}", message);
        let context_id = self.sequencer.as_ref().map(|s| s.context_id().to_string());
        self.emit(TurnEvent::AudioError {
            context_id,
            message,
        })
        .await;
        self.finish_turn();
    }

    // -------------------------------------------------------------------------
    // Deadlines and bookkeeping
    // -------------------------------------------------------------------------

    fn next_deadline(&self) -> Option<Instant> {
        [self.stt_deadline, self.llm_deadline, self.tts_deadline]
            .into_iter()
            .flatten()
            .min()
    }

    async fn on_deadline(&mut self) {
        let now = Instant::now();

        if self.llm_deadline.is_some_and(|d| now >= d) {
            self.on_llm_timeout().await;
        }

        if self.tts_deadline.is_some_and(|d| now >= d) {
            self.tts_setup = None;
            self.tts_stream = None;
            self.fail_synthesis(format!(
                "Audio generation timed out after {}s",
                self.config.tts_timeout.as_secs()
            ))
            .await;
        }

        if self.stt_deadline.is_some_and(|d| now >= d) {
            self.stt_deadline = None;
            match self.state {
                TurnState::Transcribing => {
                    warn!(session_id = %self.session.id(), "No end of turn within recognizer timeout");
                    self.emit(TurnEvent::error(format!(
                        "Speech recognition timed out after {}s",
                        self.config.stt_timeout.as_secs()
                    )))
                    .await;
                    self.set_state(TurnState::Idle);
                }
                TurnState::Listening => {
                    debug!(session_id = %self.session.id(), "No speech detected, back to idle");
                    self.set_state(TurnState::Idle);
                }
                _ => {}
            }
        }
    }

    /// Resolve the current turn and free the generation/synthesis slot.
    fn finish_turn(&mut self) {
        self.llm_setup = None;
        self.llm_stream = None;
        self.llm_deadline = None;
        self.tts_setup = None;
        self.tts_stream = None;
        self.tts_deadline = None;
        self.sequencer = None;
        self.response.clear();
        self.fragments = 0;
        self.set_state(TurnState::Idle);
    }

    /// Drop every provider stream and return to idle.
    async fn release_streams(&mut self) {
        self.finish_turn();
        self.stt_deadline = None;
        let had_stream = self.stt_stream.take().is_some();
        if let Some(stt) = self.stt.as_mut()
            && (had_stream || stt.is_open())
            && let Err(e) = stt.close().await
        {
            debug!(session_id = %self.session.id(), "Recognizer close failed: {}", e);
        }
    }

    /// False once the session was reset after the current turn started.
    fn turn_is_current(&self) -> bool {
        self.session.reset_epoch() == self.turn_epoch
    }

    fn set_state(&mut self, state: TurnState) {
        if self.state != state {
            debug!(session_id = %self.session.id(), from = %self.state, to = %state, "Turn state");
            self.state = state;
            self.session.set_turn_state(state);
        }
    }

    fn emit(&self, event: TurnEvent) -> impl Future<Output = ()> + Send + 'static {
        let events = self.events.clone();
        let session = self.session.clone();
        async move {
            if events.send(event).await.is_err() {
                debug!(session_id = %session.id(), "Event receiver gone");
            }
        }
    }
}

/// Drive a parked setup future to completion and clear its slot. Dropping
/// this future leaves the setup parked for the next loop iteration.
async fn settle<T>(slot: &mut Option<Pending<T>>) -> T {
    match slot.as_mut() {
        Some(setup) => {
            let output = setup.await;
            *slot = None;
            output
        }
        None => std::future::pending().await,
    }
}

async fn next_event<T>(stream: &mut Option<EventStream<T>>) -> Option<T> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
