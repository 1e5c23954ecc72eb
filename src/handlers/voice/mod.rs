//! Voice stream WebSocket endpoint
//!
//! # Protocol
//!
//! ## Client → Server
//!
//! - **Binary frames**: microphone audio, mono, at the `sample_rate` query
//!   parameter (default 16 kHz), `pcm_s16le` or `f32le`
//! - **stop** / **__stop** / `{"type":"stop"}`: abort the current turn
//! - any other text: echoed back
//!
//! ## Server → Client
//!
//! JSON text frames tagged by `type`: `info`, `partial`, `transcript`,
//! `turn_end`, `llm_chunk`, `llm_response`, `weather`, `news`,
//! `audio_start`, `audio_chunk`, `audio_complete`, `audio_error`, `error`
//! and `echo`.

mod handler;
pub mod messages;
mod providers;

pub use handler::ws_stream_handler;
pub use messages::{ClientText, MessageRoute, OutgoingMessage, StreamParams};
pub use providers::{DefaultProviderFactory, ProviderFactory, ProviderKeys};
