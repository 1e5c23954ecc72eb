//! Environment variable loading.

use std::path::PathBuf;

use super::utils::{env_var, parse_env, parse_env_bool, parse_env_opt};
use super::{ServerConfig, TlsConfig};

/// Build a configuration from environment variables over the defaults.
pub(super) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();

    // Server
    if let Some(host) = env_var("HOST") {
        config.host = host;
    }
    config.port = parse_env("PORT", config.port)?;
    if parse_env_bool("TLS_ENABLED", false)? {
        let cert_path = env_var("TLS_CERT_PATH")
            .ok_or("TLS_ENABLED is set but TLS_CERT_PATH is missing")?;
        let key_path =
            env_var("TLS_KEY_PATH").ok_or("TLS_ENABLED is set but TLS_KEY_PATH is missing")?;
        config.tls = Some(TlsConfig {
            cert_path: PathBuf::from(cert_path),
            key_path: PathBuf::from(key_path),
        });
    }

    // Provider keys
    config.assemblyai_api_key = env_var("ASSEMBLYAI_API_KEY");
    config.gemini_api_key = env_var("GEMINI_API_KEY");
    config.murf_api_key = env_var("MURF_API_KEY");
    config.newsapi_key = env_var("NEWSAPI_KEY");
    config.weather_api_key = env_var("WEATHER_API_KEY");

    // Provider settings
    if let Some(model) = env_var("GEMINI_MODEL") {
        config.gemini_model = model;
    }
    if let Some(voice) = env_var("MURF_VOICE_ID") {
        config.murf_voice_id = voice;
    }
    if let Some(style) = env_var("MURF_VOICE_STYLE") {
        config.murf_voice_style = style;
    }
    config.murf_sample_rate = parse_env("MURF_SAMPLE_RATE", config.murf_sample_rate)?;
    config.assemblyai_ws_url = env_var("ASSEMBLYAI_WS_URL");
    config.gemini_base_url = env_var("GEMINI_BASE_URL");
    config.murf_ws_url = env_var("MURF_WS_URL");
    config.weather_base_url = env_var("WEATHER_BASE_URL");
    config.newsapi_base_url = env_var("NEWSAPI_BASE_URL");

    // Pipeline
    config.auto_assistant_reply = parse_env_bool("AUTO_ASSISTANT_REPLY", config.auto_assistant_reply)?;
    config.stt_timeout_secs = parse_env("STT_TIMEOUT_SEC", config.stt_timeout_secs)?;
    config.llm_timeout_secs = parse_env("LLM_TIMEOUT_SEC", config.llm_timeout_secs)?;
    config.tts_timeout_secs = parse_env("TTS_TIMEOUT_SEC", config.tts_timeout_secs)?;
    config.keep_partial_on_timeout =
        parse_env_bool("KEEP_PARTIAL_ON_TIMEOUT", config.keep_partial_on_timeout)?;
    config.jitter_buffer_ms = parse_env("JITTER_BUFFER_MS", config.jitter_buffer_ms)?;
    config.stt_sample_rate = parse_env("STT_SAMPLE_RATE", config.stt_sample_rate)?;
    config.end_of_turn_confidence_threshold = parse_env(
        "END_OF_TURN_CONFIDENCE_THRESHOLD",
        config.end_of_turn_confidence_threshold,
    )?;
    config.min_end_of_turn_silence_ms =
        parse_env("MIN_END_OF_TURN_SILENCE_MS", config.min_end_of_turn_silence_ms)?;
    config.max_turn_silence_ms = parse_env("MAX_TURN_SILENCE_MS", config.max_turn_silence_ms)?;
    config.stt_retry_max_attempts =
        parse_env("STT_RETRY_MAX_ATTEMPTS", config.stt_retry_max_attempts)?;
    config.stt_retry_initial_delay_ms =
        parse_env("STT_RETRY_INITIAL_DELAY_MS", config.stt_retry_initial_delay_ms)?;
    config.stt_retry_max_delay_ms =
        parse_env("STT_RETRY_MAX_DELAY_MS", config.stt_retry_max_delay_ms)?;

    // Sessions
    config.history_max_messages = parse_env("HISTORY_MAX_MESSAGES", config.history_max_messages)?;
    config.session_idle_ttl_secs = parse_env("SESSION_IDLE_TTL_SECS", config.session_idle_ttl_secs)?;
    config.session_sweep_interval_secs =
        parse_env("SESSION_SWEEP_INTERVAL_SECS", config.session_sweep_interval_secs)?;
    config.default_persona = env_var("DEFAULT_PERSONA");

    // Security
    config.cors_allowed_origins = env_var("CORS_ALLOWED_ORIGINS");
    config.rate_limit_requests_per_second = parse_env(
        "RATE_LIMIT_REQUESTS_PER_SECOND",
        config.rate_limit_requests_per_second,
    )?;
    config.rate_limit_burst_size = parse_env("RATE_LIMIT_BURST_SIZE", config.rate_limit_burst_size)?;
    config.max_websocket_connections = parse_env_opt("MAX_WEBSOCKET_CONNECTIONS")?;
    config.max_connections_per_ip =
        parse_env("MAX_CONNECTIONS_PER_IP", config.max_connections_per_ip)?;

    Ok(config)
}
