use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override the environment.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///   tls:
///     enabled: true
///     cert_path: "/etc/voice-gateway/cert.pem"
///     key_path: "/etc/voice-gateway/key.pem"
///
/// providers:
///   assemblyai_api_key: "aai-key"
///   gemini_api_key: "gemini-key"
///   gemini_model: "gemini-2.5-flash"
///   murf_api_key: "murf-key"
///   murf_voice_id: "en-US-miles"
///   murf_voice_style: "Calm"
///   newsapi_key: "news-key"
///   weather_api_key: "weather-key"
///
/// pipeline:
///   auto_reply: true
///   stt_timeout_secs: 18
///   llm_timeout_secs: 20
///   tts_timeout_secs: 25
///   keep_partial_on_timeout: false
///   jitter_buffer_ms: 120
///   stt_retry:
///     max_attempts: 5
///     initial_delay_ms: 1000
///     max_delay_ms: 30000
///
/// session:
///   history_max_messages: 6
///   idle_ttl_secs: 3600
///   sweep_interval_secs: 60
///   default_persona: "default"
///
/// personas:
///   pirate: "You are a cheerful pirate. Keep replies short."
///
/// security:
///   cors_allowed_origins: "*"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
///   max_websocket_connections: 1000
///   max_connections_per_ip: 100
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub providers: Option<ProvidersYaml>,
    pub pipeline: Option<PipelineYaml>,
    pub session: Option<SessionYaml>,
    pub security: Option<SecurityYaml>,
    pub personas: BTreeMap<String, String>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Provider keys, models and endpoint overrides from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    pub assemblyai_api_key: Option<String>,
    pub assemblyai_ws_url: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub gemini_base_url: Option<String>,
    pub murf_api_key: Option<String>,
    pub murf_voice_id: Option<String>,
    pub murf_voice_style: Option<String>,
    pub murf_sample_rate: Option<u32>,
    pub murf_ws_url: Option<String>,
    pub newsapi_key: Option<String>,
    pub newsapi_base_url: Option<String>,
    pub weather_api_key: Option<String>,
    pub weather_base_url: Option<String>,
}

/// Turn pipeline tuning from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PipelineYaml {
    pub auto_reply: Option<bool>,
    pub stt_timeout_secs: Option<u64>,
    pub llm_timeout_secs: Option<u64>,
    pub tts_timeout_secs: Option<u64>,
    pub keep_partial_on_timeout: Option<bool>,
    pub jitter_buffer_ms: Option<u64>,
    pub stt_sample_rate: Option<u32>,
    pub end_of_turn_confidence_threshold: Option<f32>,
    pub min_end_of_turn_silence_ms: Option<u32>,
    pub max_turn_silence_ms: Option<u32>,
    pub stt_retry: Option<RetryYaml>,
}

/// Recognizer reconnect policy from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RetryYaml {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

/// Session table settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub history_max_messages: Option<usize>,
    /// 0 disables idle eviction
    pub idle_ttl_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub default_persona: Option<String>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080

providers:
  assemblyai_api_key: "aai-key"
  gemini_api_key: "gemini-key"
  gemini_model: "gemini-2.0-flash"
  murf_voice_id: "en-UK-hazel"

pipeline:
  auto_reply: false
  llm_timeout_secs: 12
  keep_partial_on_timeout: true
  stt_retry:
    max_attempts: 3

session:
  history_max_messages: 10
  idle_ttl_secs: 0
  default_persona: "pirate"

personas:
  pirate: "Talk like a pirate."

security:
  cors_allowed_origins: "https://app.example.com"
  max_connections_per_ip: 4
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.as_ref().unwrap();
        assert_eq!(server.host, Some("127.0.0.1".to_string()));
        assert_eq!(server.port, Some(8080));

        let providers = config.providers.as_ref().unwrap();
        assert_eq!(providers.assemblyai_api_key, Some("aai-key".to_string()));
        assert_eq!(providers.gemini_model, Some("gemini-2.0-flash".to_string()));
        assert!(providers.murf_api_key.is_none());

        let pipeline = config.pipeline.as_ref().unwrap();
        assert_eq!(pipeline.auto_reply, Some(false));
        assert_eq!(pipeline.llm_timeout_secs, Some(12));
        assert_eq!(pipeline.keep_partial_on_timeout, Some(true));
        assert_eq!(
            pipeline.stt_retry.as_ref().unwrap().max_attempts,
            Some(3)
        );

        let session = config.session.as_ref().unwrap();
        assert_eq!(session.history_max_messages, Some(10));
        assert_eq!(session.idle_ttl_secs, Some(0));
        assert_eq!(session.default_persona.as_deref(), Some("pirate"));

        assert_eq!(
            config.personas.get("pirate").map(String::as_str),
            Some("Talk like a pirate.")
        );
        assert_eq!(
            config.security.as_ref().unwrap().max_connections_per_ip,
            Some(4)
        );
    }

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
server:
  port: 9000
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        assert!(config.server.as_ref().unwrap().host.is_none());
        assert_eq!(config.server.as_ref().unwrap().port, Some(9000));
        assert!(config.providers.is_none());
        assert!(config.pipeline.is_none());
        assert!(config.personas.is_empty());
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("").unwrap();

        assert!(config.server.is_none());
        assert!(config.providers.is_none());
        assert!(config.session.is_none());
        assert!(config.security.is_none());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        fs::write(&config_path, "server:\n  host: \"localhost\"\n  port: 3000\n").unwrap();

        let config = YamlConfig::from_file(&config_path).unwrap();
        assert_eq!(
            config.server.as_ref().unwrap().host,
            Some("localhost".to_string())
        );
        assert_eq!(config.server.as_ref().unwrap().port, Some(3000));
    }

    #[test]
    fn test_from_file_not_found() {
        let path = PathBuf::from("/nonexistent/config.yaml");
        let result = YamlConfig::from_file(&path);

        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");

        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );
    }
}
