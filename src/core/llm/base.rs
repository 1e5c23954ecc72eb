//! Base trait and types for streaming text generation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::core::stream::EventStream;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LLMError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Provider error (HTTP {status}): {message}")]
    ProviderError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

pub type LLMResult<T> = Result<T, LLMError>;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub api_key: String,
    pub model: String,
    /// Override for the provider's REST endpoint
    pub base_url: Option<String>,
    /// Budget for establishing the HTTP stream
    pub request_timeout: Duration,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
            base_url: None,
            request_timeout: Duration::from_secs(20),
        }
    }
}

// =============================================================================
// Conversation Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// One generation call: the new user turn plus what came before it.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Prior turns, oldest first, excluding `prompt`
    pub history: Vec<ChatMessage>,
    /// System instruction for the assistant
    pub persona: Option<String>,
}

impl GenerationRequest {
    /// Render history and prompt as a plain transcript ending in an open
    /// assistant line.
    pub fn render_transcript(&self) -> String {
        let mut out = String::new();
        for message in &self.history {
            out.push_str(message.role.label());
            out.push_str(": ");
            out.push_str(&message.text);
            out.push('\n');
        }
        out.push_str("User: ");
        out.push_str(&self.prompt);
        out.push_str("\nAssistant:");
        out
    }
}

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupKind {
    Weather,
    News,
}

/// Structured result of a side lookup answered instead of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupReport {
    pub kind: LookupKind,
    pub data: serde_json::Value,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LLMEvent {
    /// Next piece of generated text
    Fragment(String),
    /// Side lookup result, emitted before its spoken fragment
    Lookup(LookupReport),
    /// Generation finished normally
    End,
    /// Generation failed; no further events follow
    Error(String),
}

// =============================================================================
// Trait
// =============================================================================

/// A streaming text generator.
#[async_trait]
pub trait BaseLLM: Send + Sync {
    /// Start a generation. Fragments arrive on the returned stream in order,
    /// terminated by exactly one `End` or `Error`. Dropping the stream
    /// abandons the call.
    async fn generate(&self, request: GenerationRequest) -> LLMResult<EventStream<LLMEvent>>;

    fn provider_info(&self) -> &'static str;
}
