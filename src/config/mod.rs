//! Configuration module for the voice agent gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use voice_agent_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

use crate::core::llm::LLMConfig;
use crate::core::retry::RetryPolicy;
use crate::core::session::{Capability, PersonaCatalog, SessionError};
use crate::core::stt::STTConfig;
use crate::core::tts::TTSConfig;
use crate::core::turn::{DEFAULT_AUDIO_QUEUE_SIZE, TurnConfig};

pub use yaml::YamlConfig;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the PEM certificate chain
    pub cert_path: PathBuf,
    /// Path to the PEM private key
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway:
/// - Server settings (host, port, TLS)
/// - Process default API keys for every upstream capability
/// - Provider models, voices and endpoint overrides
/// - Turn pipeline timeouts and tuning
/// - Session table sizing, expiry and personas
/// - Security settings (CORS, rate limiting, connection limits)
///
/// Secret fields are zeroized on drop. Build test configurations with
/// `ServerConfig::default()` and assign fields afterwards.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,

    // Provider API keys (process defaults, overridable per session)
    pub assemblyai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub murf_api_key: Option<String>,
    pub newsapi_key: Option<String>,
    pub weather_api_key: Option<String>,

    // Provider settings
    pub gemini_model: String,
    pub murf_voice_id: String,
    pub murf_voice_style: String,
    pub murf_sample_rate: u32,

    // Upstream endpoint overrides, mainly for testing
    pub assemblyai_ws_url: Option<String>,
    pub gemini_base_url: Option<String>,
    pub murf_ws_url: Option<String>,
    pub weather_base_url: Option<String>,
    pub newsapi_base_url: Option<String>,

    // Turn pipeline
    pub auto_assistant_reply: bool,
    pub stt_timeout_secs: u64,
    pub llm_timeout_secs: u64,
    pub tts_timeout_secs: u64,
    /// Keep partial assistant text in history when generation times out
    pub keep_partial_on_timeout: bool,
    pub jitter_buffer_ms: u64,
    /// Rate the recognizer is fed at; client audio is transcoded to it
    pub stt_sample_rate: u32,
    pub end_of_turn_confidence_threshold: f32,
    pub min_end_of_turn_silence_ms: u32,
    pub max_turn_silence_ms: u32,
    pub stt_retry_max_attempts: u32,
    pub stt_retry_initial_delay_ms: u64,
    pub stt_retry_max_delay_ms: u64,

    // Sessions
    pub history_max_messages: usize,
    /// Idle sessions are evicted after this many seconds; 0 disables expiry
    pub session_idle_ttl_secs: u64,
    pub session_sweep_interval_secs: u64,
    pub default_persona: Option<String>,
    /// Extra personas by name, in addition to the built-in default
    pub personas: BTreeMap<String, String>,

    // Security settings
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: u32,
    pub rate_limit_burst_size: u32,
    /// Global WebSocket limit; `None` means unlimited
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            tls: None,
            assemblyai_api_key: None,
            gemini_api_key: None,
            murf_api_key: None,
            newsapi_key: None,
            weather_api_key: None,
            gemini_model: "gemini-2.5-flash".to_string(),
            murf_voice_id: "en-US-miles".to_string(),
            murf_voice_style: "Calm".to_string(),
            murf_sample_rate: 44100,
            assemblyai_ws_url: None,
            gemini_base_url: None,
            murf_ws_url: None,
            weather_base_url: None,
            newsapi_base_url: None,
            auto_assistant_reply: true,
            stt_timeout_secs: 18,
            llm_timeout_secs: 20,
            tts_timeout_secs: 25,
            keep_partial_on_timeout: false,
            jitter_buffer_ms: 120,
            stt_sample_rate: 16000,
            end_of_turn_confidence_threshold: 0.75,
            min_end_of_turn_silence_ms: 160,
            max_turn_silence_ms: 2400,
            stt_retry_max_attempts: 5,
            stt_retry_initial_delay_ms: 1000,
            stt_retry_max_delay_ms: 30000,
            history_max_messages: 6,
            session_idle_ttl_secs: 3600,
            session_sweep_interval_secs: 60,
            default_persona: None,
            personas: BTreeMap::new(),
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            max_websocket_connections: None,
            max_connections_per_ip: 100,
        }
    }
}

/// Implement Drop to zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        for key in [
            &mut self.assemblyai_api_key,
            &mut self.gemini_api_key,
            &mut self.murf_api_key,
            &mut self.newsapi_key,
            &mut self.weather_api_key,
        ]
        .into_iter()
        .flatten()
        {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables (and defaults)
    ///
    /// The `.env` file is loaded by `main` before this is called, so its values
    /// are visible here unless a real environment variable overrides them.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Process default key for a capability, if configured.
    pub fn default_api_key(&self, capability: Capability) -> Option<&str> {
        let key = match capability {
            Capability::Stt => &self.assemblyai_api_key,
            Capability::Llm => &self.gemini_api_key,
            Capability::Tts => &self.murf_api_key,
            Capability::News => &self.newsapi_key,
            Capability::Weather => &self.weather_api_key,
        };
        key.as_deref()
    }

    pub fn has_default_key(&self, capability: Capability) -> bool {
        self.default_api_key(capability).is_some()
    }

    /// Resolve the key for a capability: the session override if given,
    /// otherwise the process default.
    ///
    /// # Returns
    /// * `Result<String, String>` - The API key, or a message naming the missing key
    pub fn resolve_api_key(
        &self,
        capability: Capability,
        session_override: Option<&str>,
    ) -> Result<String, String> {
        session_override
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .or_else(|| self.default_api_key(capability))
            .map(str::to_string)
            .ok_or_else(|| {
                format!(
                    "{} API key not configured (set {} or pass one for this session)",
                    capability.provider_name(),
                    capability.env_var()
                )
            })
    }

    pub fn stt_config(&self, api_key: String) -> STTConfig {
        STTConfig {
            api_key,
            sample_rate: self.stt_sample_rate,
            end_of_turn_confidence_threshold: Some(self.end_of_turn_confidence_threshold),
            min_end_of_turn_silence_ms: Some(self.min_end_of_turn_silence_ms),
            max_turn_silence_ms: Some(self.max_turn_silence_ms),
            base_url: self.assemblyai_ws_url.clone(),
            ..Default::default()
        }
    }

    pub fn llm_config(&self, api_key: String) -> LLMConfig {
        LLMConfig {
            api_key,
            model: self.gemini_model.clone(),
            base_url: self.gemini_base_url.clone(),
            request_timeout: Duration::from_secs(self.llm_timeout_secs),
        }
    }

    pub fn tts_config(&self, api_key: String) -> TTSConfig {
        TTSConfig {
            api_key,
            voice_id: self.murf_voice_id.clone(),
            style: self.murf_voice_style.clone(),
            sample_rate: self.murf_sample_rate,
            base_url: self.murf_ws_url.clone(),
            ..Default::default()
        }
    }

    pub fn stt_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.stt_retry_max_attempts,
            initial_delay_ms: self.stt_retry_initial_delay_ms,
            max_delay_ms: self.stt_retry_max_delay_ms,
            ..Default::default()
        }
    }

    pub fn turn_config(&self) -> TurnConfig {
        TurnConfig {
            auto_reply: self.auto_assistant_reply,
            stt_timeout: Duration::from_secs(self.stt_timeout_secs),
            llm_timeout: Duration::from_secs(self.llm_timeout_secs),
            tts_timeout: Duration::from_secs(self.tts_timeout_secs),
            keep_partial_on_timeout: self.keep_partial_on_timeout,
            jitter_buffer: Duration::from_millis(self.jitter_buffer_ms),
            stt_retry: self.stt_retry_policy(),
            audio_queue_size: DEFAULT_AUDIO_QUEUE_SIZE,
        }
    }

    pub fn persona_catalog(&self) -> Result<PersonaCatalog, SessionError> {
        PersonaCatalog::new(self.personas.clone(), self.default_persona.clone())
    }

    /// Idle TTL for session eviction, `None` when expiry is disabled.
    pub fn session_idle_ttl(&self) -> Option<Duration> {
        (self.session_idle_ttl_secs > 0).then(|| Duration::from_secs(self.session_idle_ttl_secs))
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.host = "localhost".to_string();
        config.assemblyai_api_key = Some("aai-default".to_string());
        config.gemini_api_key = Some("gemini-default".to_string());
        config
    }

    #[test]
    fn test_resolve_api_key_prefers_session_override() {
        let config = test_config();
        assert_eq!(
            config
                .resolve_api_key(Capability::Stt, Some("session-key"))
                .unwrap(),
            "session-key"
        );
        assert_eq!(
            config.resolve_api_key(Capability::Stt, None).unwrap(),
            "aai-default"
        );
        assert_eq!(
            config.resolve_api_key(Capability::Llm, Some("  ")).unwrap(),
            "gemini-default"
        );
    }

    #[test]
    fn test_resolve_api_key_missing_names_variable() {
        let config = test_config();
        let err = config.resolve_api_key(Capability::Tts, None).unwrap_err();
        assert!(err.contains("Murf"));
        assert!(err.contains("MURF_API_KEY"));
        assert!(!config.has_default_key(Capability::News));
        assert!(config.has_default_key(Capability::Stt));
    }

    #[test]
    fn test_derived_provider_configs() {
        let mut config = test_config();
        config.stt_sample_rate = 8000;
        config.murf_voice_id = "en-UK-hazel".to_string();
        config.gemini_base_url = Some("http://127.0.0.1:9000".to_string());

        let stt = config.stt_config("k".to_string());
        assert_eq!(stt.sample_rate, 8000);
        assert_eq!(stt.max_turn_silence_ms, Some(2400));

        let tts = config.tts_config("k".to_string());
        assert_eq!(tts.voice_id, "en-UK-hazel");
        assert_eq!(tts.sample_rate, 44100);

        let llm = config.llm_config("k".to_string());
        assert_eq!(llm.base_url.as_deref(), Some("http://127.0.0.1:9000"));
        assert_eq!(llm.request_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_turn_config_and_ttl() {
        let mut config = test_config();
        config.keep_partial_on_timeout = true;
        config.jitter_buffer_ms = 200;
        let turn = config.turn_config();
        assert!(turn.keep_partial_on_timeout);
        assert_eq!(turn.jitter_buffer, Duration::from_millis(200));
        assert_eq!(turn.stt_timeout, Duration::from_secs(18));
        assert_eq!(turn.stt_retry.max_attempts, 5);

        assert_eq!(
            config.session_idle_ttl(),
            Some(Duration::from_secs(3600))
        );
        config.session_idle_ttl_secs = 0;
        assert_eq!(config.session_idle_ttl(), None);
    }

    #[test]
    fn test_address() {
        let mut config = test_config();
        config.port = 8080;
        assert_eq!(config.address(), "localhost:8080");
        assert!(!config.is_tls_enabled());
    }

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        unsafe {
            for name in [
                "HOST",
                "PORT",
                "TLS_ENABLED",
                "TLS_CERT_PATH",
                "TLS_KEY_PATH",
                "ASSEMBLYAI_API_KEY",
                "GEMINI_API_KEY",
                "MURF_API_KEY",
                "NEWSAPI_KEY",
                "WEATHER_API_KEY",
                "GEMINI_MODEL",
                "LLM_TIMEOUT_SEC",
                "HISTORY_MAX_MESSAGES",
                "AUTO_ASSISTANT_REPLY",
                "KEEP_PARTIAL_ON_TIMEOUT",
                "SESSION_IDLE_TTL_SECS",
                "MAX_WEBSOCKET_CONNECTIONS",
                "DEFAULT_PERSONA",
            ] {
                env::remove_var(name);
            }
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3001);
        assert!(config.assemblyai_api_key.is_none());
        assert_eq!(config.gemini_model, "gemini-2.5-flash");
        assert_eq!(config.history_max_messages, 6);
        assert!(config.auto_assistant_reply);
        assert!(config.max_websocket_connections.is_none());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_values() {
        cleanup_env_vars();

        unsafe {
            env::set_var("PORT", "8088");
            env::set_var("ASSEMBLYAI_API_KEY", "env-aai");
            env::set_var("LLM_TIMEOUT_SEC", "7");
            env::set_var("AUTO_ASSISTANT_REPLY", "false");
            env::set_var("KEEP_PARTIAL_ON_TIMEOUT", "yes");
            env::set_var("MAX_WEBSOCKET_CONNECTIONS", "50");
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, 8088);
        assert_eq!(config.assemblyai_api_key.as_deref(), Some("env-aai"));
        assert_eq!(config.llm_timeout_secs, 7);
        assert!(!config.auto_assistant_reply);
        assert!(config.keep_partial_on_timeout);
        assert_eq!(config.max_websocket_connections, Some(50));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_number() {
        cleanup_env_vars();

        unsafe {
            env::set_var("PORT", "not-a-port");
        }
        let err = ServerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("Invalid value for PORT"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_tls_requires_paths() {
        cleanup_env_vars();

        unsafe {
            env::set_var("TLS_ENABLED", "true");
        }
        let err = ServerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("TLS_CERT_PATH"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080

providers:
  assemblyai_api_key: "yaml-key"

session:
  history_max_messages: 12
  default_persona: "coach"

personas:
  coach: "You are an upbeat fitness coach."
"#;

        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("HOST", "0.0.0.0");
            env::set_var("ASSEMBLYAI_API_KEY", "env-key");
            env::set_var("GEMINI_API_KEY", "env-gemini");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();

        // YAML overrides ENV
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.assemblyai_api_key.as_deref(), Some("yaml-key"));
        // ENV value kept where YAML is silent
        assert_eq!(config.gemini_api_key.as_deref(), Some("env-gemini"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.history_max_messages, 12);

        let catalog = config.persona_catalog().unwrap();
        assert_eq!(catalog.default_persona().name, "coach");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let config_path = PathBuf::from("/nonexistent/config.yaml");
        let result = ServerConfig::from_file(&config_path);

        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_invalid_yaml() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");
        fs::write(&config_path, "invalid: yaml: [content").unwrap();

        let result = ServerConfig::from_file(&config_path);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_tls_disabled_clears_env_tls() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let cert = temp_dir.path().join("cert.pem");
        let key = temp_dir.path().join("key.pem");
        fs::write(&cert, "cert").unwrap();
        fs::write(&key, "key").unwrap();

        unsafe {
            env::set_var("TLS_ENABLED", "true");
            env::set_var("TLS_CERT_PATH", cert.to_str().unwrap());
            env::set_var("TLS_KEY_PATH", key.to_str().unwrap());
        }

        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "server:\n  tls:\n    enabled: false\n").unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();
        assert!(!config.is_tls_enabled());

        let config = ServerConfig::from_env().unwrap();
        assert!(config.is_tls_enabled());

        cleanup_env_vars();
    }
}
