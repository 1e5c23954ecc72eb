//! HTTP provider tests against mocked upstreams: Gemini streaming, the
//! weather and news lookups, and the intent router that ties them together.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voice_agent_gateway::core::intent::{IntentRouter, LookupError, NewsClient, WeatherClient};
use voice_agent_gateway::core::llm::LookupKind;
use voice_agent_gateway::core::stream::EventStream;
use voice_agent_gateway::{BaseLLM, ChatMessage, GeminiLLM, GenerationRequest, LLMConfig, LLMError, LLMEvent};

fn sse(payloads: &[serde_json::Value]) -> String {
    payloads
        .iter()
        .map(|p| format!("data: {p}\r\n\r\n"))
        .collect()
}

fn text_chunk(text: &str) -> serde_json::Value {
    json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
}

fn gemini(server: &MockServer) -> GeminiLLM {
    GeminiLLM::new(LLMConfig {
        api_key: "test-gemini-key".to_string(),
        model: "gemini-test".to_string(),
        base_url: Some(server.uri()),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

async fn collect(mut stream: EventStream<LLMEvent>) -> Vec<LLMEvent> {
    let mut events = Vec::new();
    while let Some(event) = timeout(Duration::from_secs(5), stream.recv())
        .await
        .expect("generation stalled")
    {
        let done = matches!(event, LLMEvent::End | LLMEvent::Error(_));
        events.push(event);
        if done {
            break;
        }
    }
    events
}

// =============================================================================
// Gemini
// =============================================================================

#[tokio::test]
async fn test_gemini_streams_fragments_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-test:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "test-gemini-key"))
        .and(body_partial_json(json!({
            "system_instruction": {"parts": [{"text": "Be brief."}]}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse(&[
                    text_chunk("Hello"),
                    text_chunk(", world"),
                    json!({"candidates": [{"finishReason": "STOP"}]}),
                ])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let stream = gemini(&server)
        .generate(GenerationRequest {
            prompt: "Say hello".to_string(),
            history: vec![ChatMessage::user("Hi"), ChatMessage::assistant("Hey")],
            persona: Some("Be brief.".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(
        collect(stream).await,
        vec![
            LLMEvent::Fragment("Hello".to_string()),
            LLMEvent::Fragment(", world".to_string()),
            LLMEvent::End,
        ]
    );
}

#[tokio::test]
async fn test_gemini_in_stream_error_ends_generation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse(&[
            text_chunk("Partial"),
            json!({"error": {"code": 429, "message": "Resource exhausted"}}),
        ])))
        .mount(&server)
        .await;

    let events = collect(
        gemini(&server)
            .generate(GenerationRequest {
                prompt: "hi".to_string(),
                ..Default::default()
            })
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(events[0], LLMEvent::Fragment("Partial".to_string()));
    assert_eq!(
        events[1],
        LLMEvent::Error("Gemini error 429: Resource exhausted".to_string())
    );
}

#[tokio::test]
async fn test_gemini_rejected_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "API key not valid"}
        })))
        .mount(&server)
        .await;

    let result = gemini(&server)
        .generate(GenerationRequest {
            prompt: "hi".to_string(),
            ..Default::default()
        })
        .await;
    assert_eq!(
        result.err(),
        Some(LLMError::AuthenticationFailed("API key not valid".to_string()))
    );
}

#[tokio::test]
async fn test_gemini_server_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    match gemini(&server)
        .generate(GenerationRequest::default())
        .await
    {
        Err(LLMError::ProviderError { status, message }) => {
            assert_eq!(status, 503);
            assert_eq!(message, "overloaded");
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

// =============================================================================
// Lookups
// =============================================================================

fn weather_client(server: &MockServer, key: Option<&str>) -> WeatherClient {
    WeatherClient::new(
        reqwest::Client::new(),
        Some(server.uri()),
        key.map(str::to_string),
    )
}

fn news_client(server: &MockServer, key: Option<&str>) -> NewsClient {
    NewsClient::new(
        reqwest::Client::new(),
        Some(server.uri()),
        key.map(str::to_string),
    )
}

async fn mount_weather(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/current.json"))
        .and(query_param("key", "weather-key"))
        .and(query_param("q", "paris"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "location": {"name": "Paris", "country": "France"},
            "current": {"temp_c": 18.5, "condition": {"text": "Partly cloudy"}}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_weather_current() {
    let server = MockServer::start().await;
    mount_weather(&server).await;

    let report = weather_client(&server, Some("weather-key"))
        .current("paris")
        .await
        .unwrap();
    assert_eq!(report.location, "Paris");
    assert_eq!(report.country, "France");
    assert_eq!(report.temperature_c, 18.5);
    assert_eq!(
        report.summary(),
        "Current weather in Paris, France: Partly cloudy. Temperature 18.5°C."
    );
}

#[tokio::test]
async fn test_weather_api_error_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 1006, "message": "No matching location found."}
        })))
        .mount(&server)
        .await;

    let err = weather_client(&server, Some("weather-key"))
        .current("atlantis")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No matching location found.");
}

#[tokio::test]
async fn test_weather_invalid_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = weather_client(&server, Some("wrong"))
        .current("paris")
        .await
        .unwrap_err();
    assert!(matches!(err, LookupError::InvalidKey { service: "Weather" }));
}

#[tokio::test]
async fn test_weather_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let err = weather_client(&server, Some("weather-key"))
        .with_timeout(Duration::from_millis(100))
        .current("paris")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Weather request timed out");
}

#[tokio::test]
async fn test_news_top_headlines() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .and(query_param("country", "us"))
        .and(query_param("pageSize", "2"))
        .and(header("X-Api-Key", "news-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "articles": [
                {"title": "Rust 2.0 announced", "source": {"name": "Example Times"}},
                {"title": null, "source": {"name": "Skipped"}},
                {"title": "Markets rally", "description": "Stocks up", "source": {}}
            ]
        })))
        .mount(&server)
        .await;

    let headlines = news_client(&server, Some("news-key"))
        .top_headlines("us", 2)
        .await
        .unwrap();
    assert_eq!(headlines.len(), 2);
    assert_eq!(headlines[0].title, "Rust 2.0 announced");
    assert_eq!(headlines[0].source, "Example Times");
    assert_eq!(headlines[1].source, "unknown");
}

#[tokio::test]
async fn test_news_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(426).set_body_json(json!({
            "status": "error",
            "code": "corsNotAllowed",
            "message": "Requests from the browser are not allowed"
        })))
        .mount(&server)
        .await;

    let err = news_client(&server, Some("news-key"))
        .top_headlines("us", 5)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Requests from the browser are not allowed");
}

// =============================================================================
// Intent router
// =============================================================================

#[tokio::test]
async fn test_router_answers_weather_from_lookup() {
    let server = MockServer::start().await;
    mount_weather(&server).await;

    let router = IntentRouter::new(
        None,
        weather_client(&server, Some("weather-key")),
        news_client(&server, None),
    );
    let events = collect(
        router
            .generate(GenerationRequest {
                prompt: "What's the weather in Paris?".to_string(),
                ..Default::default()
            })
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(events.len(), 3);
    match &events[0] {
        LLMEvent::Lookup(report) => {
            assert_eq!(report.kind, LookupKind::Weather);
            assert_eq!(report.data["location"], "Paris");
        }
        other => panic!("expected lookup, got {other:?}"),
    }
    assert_eq!(
        events[1],
        LLMEvent::Fragment(
            "Current weather in Paris, France: Partly cloudy. Temperature 18.5°C.".to_string()
        )
    );
    assert_eq!(events[2], LLMEvent::End);
}

#[tokio::test]
async fn test_router_news_without_key_falls_back() {
    let server = MockServer::start().await;

    let router = IntentRouter::new(
        None,
        weather_client(&server, None),
        news_client(&server, None),
    );
    let events = collect(
        router
            .generate(GenerationRequest {
                prompt: "Any news today?".to_string(),
                ..Default::default()
            })
            .await
            .unwrap(),
    )
    .await;

    match &events[0] {
        LLMEvent::Lookup(report) => {
            assert_eq!(report.kind, LookupKind::News);
            assert!(report.data.is_null());
        }
        other => panic!("expected lookup, got {other:?}"),
    }
    assert_eq!(events.last(), Some(&LLMEvent::End));
}

#[tokio::test]
async fn test_router_forwards_plain_prompts_to_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-test:streamGenerateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse(&[text_chunk("Hi!")])))
        .mount(&server)
        .await;

    let model: Arc<dyn BaseLLM> = Arc::new(gemini(&server));
    let router = IntentRouter::new(
        Some(model),
        weather_client(&server, None),
        news_client(&server, None),
    );
    let events = collect(
        router
            .generate(GenerationRequest {
                prompt: "Tell me a joke".to_string(),
                ..Default::default()
            })
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(
        events,
        vec![LLMEvent::Fragment("Hi!".to_string()), LLMEvent::End]
    );
}

#[tokio::test]
async fn test_router_without_model_rejects_plain_prompts() {
    let server = MockServer::start().await;
    let router = IntentRouter::new(
        None,
        weather_client(&server, None),
        news_client(&server, None),
    );
    let result = router
        .generate(GenerationRequest {
            prompt: "Tell me a joke".to_string(),
            ..Default::default()
        })
        .await;
    assert_eq!(
        result.err(),
        Some(LLMError::ConfigurationError(
            "No language model configured for this session".to_string()
        ))
    );
}
