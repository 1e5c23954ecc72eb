//! Keyword intents answered by side lookups instead of the language model.
//!
//! [`IntentRouter`] wraps the session's generator. Weather and news requests
//! are served by a lookup task that speaks the same [`LLMEvent`] stream shape
//! (`Lookup`, one `Fragment`, `End`), so the turn coordinator treats them
//! exactly like a generation and bounds them by the same timeout.

pub mod news;
pub mod weather;

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::llm::{
    BaseLLM, GenerationRequest, LLMError, LLMEvent, LLMResult, LookupKind, LookupReport,
};
use crate::core::stream::{EventSink, EventStream, event_channel};

pub use news::{Headline, NEWSAPI_BASE_URL, NewsClient, summarize};
pub use weather::{WEATHER_BASE_URL, WeatherClient, WeatherReport};

const DEFAULT_CITY: &str = "New York";
const NEWS_COUNTRY: &str = "us";
const NEWS_PAGE_SIZE: u32 = 5;
const NEWS_FALLBACK: &str =
    "I couldn't fetch headlines right now. Check if your News API key is configured.";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LookupError {
    #[error("{service} API key not provided")]
    MissingKey { service: &'static str },

    #[error("Invalid {service} API key")]
    InvalidKey { service: &'static str },

    #[error("{service} API error: {status} - {body}")]
    Http {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{message}")]
    Api {
        service: &'static str,
        message: String,
    },

    #[error("{service} request timed out")]
    Timeout { service: &'static str },

    #[error("{service} service error: {message}")]
    Network {
        service: &'static str,
        message: String,
    },

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LookupError {
    pub(crate) fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LookupError::Timeout { service }
        } else {
            LookupError::Network {
                service,
                message: err.to_string(),
            }
        }
    }
}

// =============================================================================
// Detection
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Weather { city: String },
    News,
}

/// Classify a user utterance. Weather wins over news when both match.
pub fn detect_intent(text: &str) -> Option<Intent> {
    let lower = text.to_lowercase();
    if ["weather", "temperature", "forecast"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        return Some(Intent::Weather {
            city: extract_city(&lower).unwrap_or_else(|| DEFAULT_CITY.to_string()),
        });
    }
    if ["news", "headlines", "latest"].iter().any(|kw| lower.contains(kw)) {
        return Some(Intent::News);
    }
    None
}

/// Text after the first " in ", cut at "?" or " for ".
fn extract_city(lower: &str) -> Option<String> {
    let (_, rest) = lower.split_once(" in ")?;
    let rest = rest.split('?').next().unwrap_or_default();
    let city = rest.split(" for ").next().unwrap_or_default();
    let city = city.trim().trim_end_matches(['.', '!', ',']).trim();
    (!city.is_empty()).then(|| city.to_string())
}

// =============================================================================
// Router
// =============================================================================

/// Generator that answers detected intents from lookups and forwards
/// everything else to the wrapped model.
pub struct IntentRouter {
    llm: Option<Arc<dyn BaseLLM>>,
    weather: WeatherClient,
    news: NewsClient,
}

impl IntentRouter {
    pub fn new(llm: Option<Arc<dyn BaseLLM>>, weather: WeatherClient, news: NewsClient) -> Self {
        Self { llm, weather, news }
    }

    async fn resolve(intent: Intent, weather: &WeatherClient, news: &NewsClient) -> LookupReport {
        match intent {
            Intent::Weather { city } => match weather.current(&city).await {
                Ok(report) => LookupReport {
                    kind: LookupKind::Weather,
                    text: report.summary(),
                    data: serde_json::to_value(&report).unwrap_or_default(),
                },
                Err(e) => {
                    warn!(city = %city, "Weather lookup failed: {}", e);
                    LookupReport {
                        kind: LookupKind::Weather,
                        data: json!({ "error": e.to_string() }),
                        text: format!("Sorry, I couldn't fetch the weather: {e}"),
                    }
                }
            },
            Intent::News => match news.top_headlines(NEWS_COUNTRY, NEWS_PAGE_SIZE).await {
                Ok(headlines) if !headlines.is_empty() => LookupReport {
                    kind: LookupKind::News,
                    text: summarize(&headlines),
                    data: serde_json::to_value(&headlines).unwrap_or_default(),
                },
                Ok(_) => LookupReport {
                    kind: LookupKind::News,
                    data: json!([]),
                    text: NEWS_FALLBACK.to_string(),
                },
                Err(e) => {
                    warn!("News lookup failed: {}", e);
                    LookupReport {
                        kind: LookupKind::News,
                        data: serde_json::Value::Null,
                        text: NEWS_FALLBACK.to_string(),
                    }
                }
            },
        }
    }

    async fn run_lookup(
        intent: Intent,
        weather: WeatherClient,
        news: NewsClient,
        sink: EventSink<LLMEvent>,
    ) {
        let report = tokio::select! {
            _ = sink.cancelled() => return,
            report = Self::resolve(intent, &weather, &news) => report,
        };

        let text = report.text.clone();
        if sink.send(LLMEvent::Lookup(report)).await && sink.send(LLMEvent::Fragment(text)).await {
            sink.send(LLMEvent::End).await;
        }
    }
}

#[async_trait]
impl BaseLLM for IntentRouter {
    async fn generate(&self, request: GenerationRequest) -> LLMResult<EventStream<LLMEvent>> {
        if let Some(intent) = detect_intent(&request.prompt) {
            info!(?intent, "Answering from side lookup");
            let (sink, stream) = event_channel(4);
            tokio::spawn(Self::run_lookup(
                intent,
                self.weather.clone(),
                self.news.clone(),
                sink,
            ));
            return Ok(stream);
        }

        match &self.llm {
            Some(llm) => llm.generate(request).await,
            None => Err(LLMError::ConfigurationError(
                "No language model configured for this session".to_string(),
            )),
        }
    }

    fn provider_info(&self) -> &'static str {
        "Intent router"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weather_city_extraction() {
        assert_eq!(
            detect_intent("What's the weather in Paris?"),
            Some(Intent::Weather {
                city: "paris".to_string()
            })
        );
        assert_eq!(
            detect_intent("Give me the forecast in San Francisco for tomorrow"),
            Some(Intent::Weather {
                city: "san francisco".to_string()
            })
        );
        assert_eq!(
            detect_intent("What's the temperature in Oslo."),
            Some(Intent::Weather {
                city: "oslo".to_string()
            })
        );
    }

    #[test]
    fn test_weather_defaults_city() {
        assert_eq!(
            detect_intent("How is the weather today?"),
            Some(Intent::Weather {
                city: DEFAULT_CITY.to_string()
            })
        );
    }

    #[test]
    fn test_news_and_precedence() {
        assert_eq!(detect_intent("Any headlines this morning?"), Some(Intent::News));
        assert_eq!(detect_intent("Tell me the latest"), Some(Intent::News));
        assert!(matches!(
            detect_intent("latest weather please"),
            Some(Intent::Weather { .. })
        ));
        assert_eq!(detect_intent("Tell me a joke"), None);
    }

    #[tokio::test]
    async fn test_failed_lookup_gives_apologetic_reply() {
        let client = reqwest::Client::new();
        let router = IntentRouter::new(
            None,
            WeatherClient::new(client.clone(), None, None),
            NewsClient::new(client, None, None),
        );

        let mut stream = router
            .generate(GenerationRequest {
                prompt: "weather in Rome".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        match stream.recv().await {
            Some(LLMEvent::Lookup(report)) => {
                assert_eq!(report.kind, LookupKind::Weather);
                assert_eq!(report.data["error"], "Weather API key not provided");
            }
            other => panic!("Expected lookup, got {other:?}"),
        }
        assert_eq!(
            stream.recv().await,
            Some(LLMEvent::Fragment(
                "Sorry, I couldn't fetch the weather: Weather API key not provided".to_string()
            ))
        );
        assert_eq!(stream.recv().await, Some(LLMEvent::End));
    }

    #[tokio::test]
    async fn test_plain_prompt_without_model_is_error() {
        let client = reqwest::Client::new();
        let router = IntentRouter::new(
            None,
            WeatherClient::new(client.clone(), None, None),
            NewsClient::new(client, None, None),
        );
        let result = router
            .generate(GenerationRequest {
                prompt: "hello".to_string(),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(LLMError::ConfigurationError(_))));
    }
}
