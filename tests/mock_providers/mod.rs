//! Scripted provider adapters for exercising the turn coordinator and the
//! voice stream without network access.
//!
//! Each mock shares a control handle with the test so it can push recognizer events,
//! script generation and synthesis output, and inspect what the coordinator
//! asked for.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use voice_agent_gateway::core::stream::{EVENT_BUFFER_SIZE, EventSink, EventStream, event_channel};
use voice_agent_gateway::{
    BaseLLM, BaseSTT, BaseTTS, GenerationRequest, LLMEvent, LLMResult, STTConfig, STTError,
    STTEvent, STTResult, TTSConfig, TTSEvent, TTSResult,
};

// =============================================================================
// Speech-to-text
// =============================================================================

#[derive(Default)]
struct SttState {
    sink: Option<EventSink<STTEvent>>,
    opens: u32,
    closes: u32,
    submitted: usize,
    failing_opens: u32,
    open_gate: Option<Arc<Notify>>,
}

/// Test side of a [`MockSTT`].
#[derive(Clone, Default)]
pub struct SttControl(Arc<Mutex<SttState>>);

impl SttControl {
    /// Make the next `n` calls to `open` fail.
    pub fn fail_opens(&self, n: u32) {
        self.0.lock().failing_opens = n;
    }

    /// Park the next call to `open` until `gate` is notified.
    pub fn hold_open(&self, gate: Arc<Notify>) {
        self.0.lock().open_gate = Some(gate);
    }

    /// Wait until `open` has been called at least `n` times.
    pub async fn wait_for_opens(&self, n: u32) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.opens() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("recognizer open was never attempted");
    }

    /// Wait until at least `n` frames reached the recognizer.
    pub async fn wait_for_submitted(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.submitted() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("audio never reached the recognizer");
    }

    /// Deliver a recognizer event, waiting for the stream to be opened.
    pub async fn push(&self, event: STTEvent) {
        let sink = self.wait_for_sink().await;
        assert!(sink.send(event).await, "recognizer stream was dropped");
    }

    async fn wait_for_sink(&self) -> EventSink<STTEvent> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(sink) = self.0.lock().sink.clone() {
                    return sink;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("recognizer was never opened")
    }

    pub fn opens(&self) -> u32 {
        self.0.lock().opens
    }

    pub fn closes(&self) -> u32 {
        self.0.lock().closes
    }

    pub fn submitted(&self) -> usize {
        self.0.lock().submitted
    }

    pub fn is_open(&self) -> bool {
        self.0.lock().sink.is_some()
    }
}

pub struct MockSTT {
    control: SttControl,
    open: bool,
}

impl MockSTT {
    pub fn with_control(control: SttControl) -> Self {
        Self {
            control,
            open: false,
        }
    }
}

#[async_trait]
impl BaseSTT for MockSTT {
    fn new(_config: STTConfig) -> STTResult<Self> {
        Ok(Self::with_control(SttControl::default()))
    }

    async fn open(&mut self) -> STTResult<EventStream<STTEvent>> {
        let gate = {
            let mut state = self.control.0.lock();
            state.opens += 1;
            state.open_gate.take()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.control.0.lock();
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(STTError::ConnectionFailed("connection refused".to_string()));
        }
        let (sink, stream) = event_channel(EVENT_BUFFER_SIZE);
        state.sink = Some(sink);
        self.open = true;
        Ok(stream)
    }

    async fn submit(&mut self, _audio: Bytes) -> STTResult<()> {
        if !self.open {
            return Err(STTError::NotConnected);
        }
        self.control.0.lock().submitted += 1;
        Ok(())
    }

    async fn close(&mut self) -> STTResult<()> {
        self.open = false;
        let mut state = self.control.0.lock();
        state.sink = None;
        state.closes += 1;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn provider_info(&self) -> &'static str {
        "Mock STT"
    }
}

// =============================================================================
// Scripts shared by generation and synthesis
// =============================================================================

/// One step of a scripted provider call.
#[derive(Clone)]
pub enum Step<E> {
    Send(E),
    /// Wait until the test releases the gate
    Wait(Arc<Notify>),
    /// Keep the stream open until the consumer cancels it
    Hang,
}

async fn play<E: Send + 'static>(steps: Vec<Step<E>>, sink: EventSink<E>, cancelled: Arc<Mutex<u32>>) {
    for step in steps {
        match step {
            Step::Send(event) => {
                if !sink.send(event).await {
                    *cancelled.lock() += 1;
                    return;
                }
            }
            Step::Wait(gate) => {
                tokio::select! {
                    _ = gate.notified() => {}
                    _ = sink.cancelled() => {
                        *cancelled.lock() += 1;
                        return;
                    }
                }
            }
            Step::Hang => {
                sink.cancelled().await;
                *cancelled.lock() += 1;
                return;
            }
        }
    }
}

// =============================================================================
// Generation
// =============================================================================

/// Scripted generator. Unscripted calls reply `Reply to <prompt>`.
#[derive(Clone, Default)]
pub struct MockLLM {
    scripts: Arc<Mutex<VecDeque<Vec<Step<LLMEvent>>>>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
    cancelled: Arc<Mutex<u32>>,
    setup_gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl MockLLM {
    pub fn script(&self, steps: Vec<Step<LLMEvent>>) {
        self.scripts.lock().push_back(steps);
    }

    /// Keep the next `generate` call from returning until `gate` is notified.
    pub fn hold_setup(&self, gate: Arc<Notify>) {
        *self.setup_gate.lock() = Some(gate);
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    pub fn cancelled(&self) -> u32 {
        *self.cancelled.lock()
    }
}

pub fn fragments(parts: &[&str]) -> Vec<Step<LLMEvent>> {
    parts
        .iter()
        .map(|p| Step::Send(LLMEvent::Fragment(p.to_string())))
        .chain(std::iter::once(Step::Send(LLMEvent::End)))
        .collect()
}

#[async_trait]
impl BaseLLM for MockLLM {
    async fn generate(&self, request: GenerationRequest) -> LLMResult<EventStream<LLMEvent>> {
        let steps = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| fragments(&["Reply to ", &request.prompt]));
        self.requests.lock().push(request);

        let gate = self.setup_gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let (sink, stream) = event_channel(EVENT_BUFFER_SIZE);
        tokio::spawn(play(steps, sink, self.cancelled.clone()));
        Ok(stream)
    }

    fn provider_info(&self) -> &'static str {
        "Mock LLM"
    }
}

// =============================================================================
// Synthesis
// =============================================================================

pub const MOCK_TTS_SAMPLE_RATE: u32 = 16000;

/// 10 ms of silence at [`MOCK_TTS_SAMPLE_RATE`]
pub fn pcm_chunk() -> Bytes {
    Bytes::from(vec![0u8; 320])
}

/// Scripted synthesizer. Unscripted calls produce two chunks.
#[derive(Clone, Default)]
pub struct MockTTS {
    scripts: Arc<Mutex<VecDeque<Vec<Step<TTSEvent>>>>>,
    texts: Arc<Mutex<Vec<(String, String)>>>,
    cancelled: Arc<Mutex<u32>>,
    setup_gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl MockTTS {
    pub fn script(&self, steps: Vec<Step<TTSEvent>>) {
        self.scripts.lock().push_back(steps);
    }

    /// Keep the next `synthesize` call from returning until `gate` is notified.
    pub fn hold_setup(&self, gate: Arc<Notify>) {
        *self.setup_gate.lock() = Some(gate);
    }

    /// `(text, context_id)` per synthesis call
    pub fn texts(&self) -> Vec<(String, String)> {
        self.texts.lock().clone()
    }

    pub fn cancelled(&self) -> u32 {
        *self.cancelled.lock()
    }
}

pub fn chunks(count: usize) -> Vec<Step<TTSEvent>> {
    (0..count)
        .map(|i| {
            Step::Send(TTSEvent::Chunk {
                audio: pcm_chunk(),
                is_final: i + 1 == count,
            })
        })
        .chain(std::iter::once(Step::Send(TTSEvent::Complete)))
        .collect()
}

#[async_trait]
impl BaseTTS for MockTTS {
    fn new(_config: TTSConfig) -> TTSResult<Self> {
        Ok(Self::default())
    }

    async fn synthesize(&self, text: &str, context_id: &str) -> TTSResult<EventStream<TTSEvent>> {
        let steps = self.scripts.lock().pop_front().unwrap_or_else(|| chunks(2));
        self.texts
            .lock()
            .push((text.to_string(), context_id.to_string()));

        let gate = self.setup_gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let (sink, stream) = event_channel(EVENT_BUFFER_SIZE);
        tokio::spawn(play(steps, sink, self.cancelled.clone()));
        Ok(stream)
    }

    fn sample_rate(&self) -> u32 {
        MOCK_TTS_SAMPLE_RATE
    }

    fn provider_info(&self) -> &'static str {
        "Mock TTS"
    }
}
