//! Construction of per-session provider adapters.

use std::sync::Arc;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::ServerConfig;
use crate::core::intent::{IntentRouter, NewsClient, WeatherClient};
use crate::core::llm::{BaseLLM, GeminiLLM};
use crate::core::stt::create_stt_provider;
use crate::core::tts::create_tts_provider;
use crate::core::turn::TurnCapabilities;

/// Keys resolved for one connection. Recognition is mandatory; the rest
/// are optional and disable only their own stage when absent.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct ProviderKeys {
    pub stt: String,
    pub llm: Option<String>,
    pub tts: Option<String>,
    pub news: Option<String>,
    pub weather: Option<String>,
}

impl std::fmt::Debug for ProviderKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderKeys")
            .field("llm", &self.llm.is_some())
            .field("tts", &self.tts.is_some())
            .field("news", &self.news.is_some())
            .field("weather", &self.weather.is_some())
            .finish_non_exhaustive()
    }
}

/// Builds the adapters a session's turn coordinator drives.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, config: &ServerConfig, keys: &ProviderKeys) -> Result<TurnCapabilities, String>;
}

/// AssemblyAI recognition, Gemini generation behind the intent router, and
/// Murf synthesis.
pub struct DefaultProviderFactory {
    client: reqwest::Client,
}

impl DefaultProviderFactory {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ProviderFactory for DefaultProviderFactory {
    fn build(&self, config: &ServerConfig, keys: &ProviderKeys) -> Result<TurnCapabilities, String> {
        let stt = create_stt_provider("assemblyai", config.stt_config(keys.stt.clone()))
            .map_err(|e| format!("Speech recognition setup failed: {e}"))?;

        let gemini: Option<Arc<dyn BaseLLM>> = match &keys.llm {
            Some(key) => Some(Arc::new(
                GeminiLLM::with_client(config.llm_config(key.clone()), self.client.clone())
                    .map_err(|e| format!("Language model setup failed: {e}"))?,
            )),
            None => None,
        };

        let lookup_timeout = Duration::from_secs(config.llm_timeout_secs);
        let weather = WeatherClient::new(
            self.client.clone(),
            config.weather_base_url.clone(),
            keys.weather.clone(),
        )
        .with_timeout(lookup_timeout);
        let news = NewsClient::new(
            self.client.clone(),
            config.newsapi_base_url.clone(),
            keys.news.clone(),
        )
        .with_timeout(lookup_timeout);
        let llm: Arc<dyn BaseLLM> = Arc::new(IntentRouter::new(gemini, weather, news));

        let tts = keys
            .tts
            .as_ref()
            .map(|key| create_tts_provider("murf", config.tts_config(key.clone())))
            .transpose()
            .map_err(|e| format!("Speech synthesis setup failed: {e}"))?
            .map(Arc::from);

        Ok(TurnCapabilities {
            stt,
            llm: Some(llm),
            tts,
        })
    }
}
