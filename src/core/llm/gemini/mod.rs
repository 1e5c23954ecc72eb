//! Google Gemini text generation via `streamGenerateContent` (SSE).

mod client;
mod config;
mod messages;

pub use client::GeminiLLM;
pub use config::{GEMINI_BASE_URL, GeminiLLMConfig};
pub use messages::{GenerateContentChunk, GenerateContentRequest, SseLineBuffer};
