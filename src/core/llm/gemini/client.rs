//! Gemini streaming text generation over server-sent events.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::config::GeminiLLMConfig;
use super::messages::{GenerateContentChunk, GenerateContentRequest, SseLineBuffer};
use crate::core::llm::base::{BaseLLM, GenerationRequest, LLMConfig, LLMError, LLMEvent, LLMResult};
use crate::core::stream::{EVENT_BUFFER_SIZE, EventSink, EventStream, event_channel};

pub struct GeminiLLM {
    config: GeminiLLMConfig,
    client: reqwest::Client,
}

impl GeminiLLM {
    pub fn new(config: LLMConfig) -> LLMResult<Self> {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Build on a shared HTTP client.
    pub fn with_client(config: LLMConfig, client: reqwest::Client) -> LLMResult<Self> {
        if config.api_key.is_empty() {
            return Err(LLMError::AuthenticationFailed(
                "API key is required for Gemini".to_string(),
            ));
        }
        if config.model.trim().is_empty() {
            return Err(LLMError::ConfigurationError(
                "Gemini model name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            config: GeminiLLMConfig::from_base(config),
            client,
        })
    }

    fn status_error(status: StatusCode, body: String) -> LLMError {
        let message = serde_json::from_str::<GenerateContentChunk>(&body)
            .ok()
            .and_then(|chunk| chunk.error)
            .map(|e| e.message)
            .filter(|m| !m.is_empty())
            .unwrap_or(body);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                LLMError::AuthenticationFailed(message)
            }
            _ => LLMError::ProviderError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Turn one SSE payload into at most one event. `Err` ends the stream.
    pub(crate) fn handle_payload(payload: &str) -> Result<Option<LLMEvent>, String> {
        match serde_json::from_str::<GenerateContentChunk>(payload) {
            Ok(chunk) => {
                if let Some(error) = chunk.error {
                    return Err(format!("Gemini error {}: {}", error.code, error.message));
                }
                let text = chunk.text();
                Ok((!text.is_empty()).then_some(LLMEvent::Fragment(text)))
            }
            Err(e) => {
                warn!("Skipping malformed Gemini SSE payload: {}", e);
                Ok(None)
            }
        }
    }

    async fn pump(response: reqwest::Response, sink: EventSink<LLMEvent>) {
        let mut body = response.bytes_stream();
        let mut lines = SseLineBuffer::default();
        let mut fragments = 0usize;

        loop {
            tokio::select! {
                _ = sink.cancelled() => {
                    debug!("Gemini generation cancelled after {} fragments", fragments);
                    return;
                }
                next = body.next() => match next {
                    Some(Ok(bytes)) => {
                        for payload in lines.push(&bytes) {
                            match Self::handle_payload(&payload) {
                                Ok(Some(event)) => {
                                    fragments += 1;
                                    if !sink.send(event).await {
                                        return;
                                    }
                                }
                                Ok(None) => {}
                                Err(reason) => {
                                    sink.send(LLMEvent::Error(reason)).await;
                                    return;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        let reason = LLMError::NetworkError(format!("Gemini stream interrupted: {e}"));
                        warn!("{}", reason);
                        sink.send(LLMEvent::Error(reason.to_string())).await;
                        return;
                    }
                    None => break,
                }
            }
        }

        if let Some(payload) = lines.finish() {
            match Self::handle_payload(&payload) {
                Ok(Some(event)) => {
                    sink.send(event).await;
                }
                Ok(None) => {}
                Err(reason) => {
                    sink.send(LLMEvent::Error(reason)).await;
                    return;
                }
            }
        }

        info!("Gemini generation finished with {} fragments", fragments);
        sink.send(LLMEvent::End).await;
    }
}

#[async_trait]
impl BaseLLM for GeminiLLM {
    async fn generate(&self, request: GenerationRequest) -> LLMResult<EventStream<LLMEvent>> {
        let url = self.config.stream_url()?;
        let body = GenerateContentRequest::new(request.render_transcript(), request.persona.as_deref());

        debug!(
            model = %self.config.base.model,
            history = request.history.len(),
            "Starting Gemini generation"
        );

        let send = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.base.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send();

        let response = timeout(self.config.base.request_timeout, send)
            .await
            .map_err(|_| LLMError::Timeout("Waiting for Gemini response".to_string()))?
            .map_err(|e| LLMError::NetworkError(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, text));
        }

        let (sink, stream) = event_channel(EVENT_BUFFER_SIZE);
        tokio::spawn(Self::pump(response, sink));
        Ok(stream)
    }

    fn provider_info(&self) -> &'static str {
        "Google Gemini (streamGenerateContent)"
    }
}
