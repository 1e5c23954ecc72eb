//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check and session inspection endpoints
//! - `voice` - Voice stream WebSocket

pub mod api;
pub mod voice;

pub use voice::ws_stream_handler;
