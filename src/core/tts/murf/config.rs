//! Configuration for the Murf streaming synthesizer.

use url::Url;

use crate::core::tts::base::{TTSConfig, TTSError};

pub const MURF_TTS_URL: &str = "wss://api.murf.ai/v1/speech/stream-input";

#[derive(Debug, Clone)]
pub struct MurfTTSConfig {
    pub base: TTSConfig,
}

impl MurfTTSConfig {
    pub fn from_base(base: TTSConfig) -> Self {
        Self { base }
    }

    /// Stream URL for one synthesis context. The API key travels in the query.
    pub fn build_websocket_url(&self, context_id: &str) -> Result<Url, TTSError> {
        let endpoint = self.base.base_url.as_deref().unwrap_or(MURF_TTS_URL);
        let mut url = Url::parse(endpoint)
            .map_err(|e| TTSError::ConfigurationError(format!("Invalid Murf URL {endpoint}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("api-key", &self.base.api_key)
            .append_pair("sample_rate", &self.base.sample_rate.to_string())
            .append_pair("channel_type", "MONO")
            .append_pair("format", "WAV")
            .append_pair("context_id", context_id);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url() {
        let config = MurfTTSConfig::from_base(TTSConfig {
            api_key: "k-1".to_string(),
            ..Default::default()
        });
        let url = config.build_websocket_url("ctx-9").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://api.murf.ai/v1/speech/stream-input?api-key=k-1&sample_rate=44100&channel_type=MONO&format=WAV&context_id=ctx-9"
        );
    }

    #[test]
    fn test_invalid_override() {
        let config = MurfTTSConfig::from_base(TTSConfig {
            base_url: Some("::".to_string()),
            ..Default::default()
        });
        assert!(matches!(
            config.build_websocket_url("c"),
            Err(TTSError::ConfigurationError(_))
        ));
    }
}
