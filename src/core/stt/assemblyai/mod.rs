//! AssemblyAI Streaming STT (v3) integration.
//!
//! Audio is streamed as raw binary PCM frames. With `format_turns` enabled the
//! server emits each end-of-turn twice; only the formatted copy surfaces as a
//! final transcript.
//!
//! - [`config`]: endpoint and query parameters
//! - [`messages`]: WebSocket message types
//! - [`client`]: the `AssemblyAISTT` connection task

mod client;
mod config;
mod messages;

pub use client::{AssemblyAISTT, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
pub use config::{
    ASSEMBLYAI_WS_URL, AssemblyAIEncoding, AssemblyAISTTConfig, AssemblyAISpeechModel,
};
pub use messages::{
    AssemblyAIMessage, BeginMessage, ErrorMessage, TerminateMessage, TerminationMessage,
    TurnMessage,
};
