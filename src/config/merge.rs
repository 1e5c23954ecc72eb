//! Merging YAML overrides onto the environment-derived configuration.

use std::path::PathBuf;

use super::env::load_from_env;
use super::yaml::YamlConfig;
use super::{ServerConfig, TlsConfig};

/// Environment first, then any YAML values on top.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = load_from_env()?;
    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        override_with(&mut config.host, server.host);
        override_with(&mut config.port, server.port);
        if let Some(tls) = server.tls {
            match tls.enabled {
                Some(false) => config.tls = None,
                Some(true) => {
                    let cert_path = tls
                        .cert_path
                        .ok_or("server.tls.enabled is true but cert_path is missing")?;
                    let key_path = tls
                        .key_path
                        .ok_or("server.tls.enabled is true but key_path is missing")?;
                    config.tls = Some(TlsConfig {
                        cert_path: PathBuf::from(cert_path),
                        key_path: PathBuf::from(key_path),
                    });
                }
                None => {}
            }
        }
    }

    if let Some(providers) = yaml.providers {
        override_opt(&mut config.assemblyai_api_key, providers.assemblyai_api_key);
        override_opt(&mut config.assemblyai_ws_url, providers.assemblyai_ws_url);
        override_opt(&mut config.gemini_api_key, providers.gemini_api_key);
        override_with(&mut config.gemini_model, providers.gemini_model);
        override_opt(&mut config.gemini_base_url, providers.gemini_base_url);
        override_opt(&mut config.murf_api_key, providers.murf_api_key);
        override_with(&mut config.murf_voice_id, providers.murf_voice_id);
        override_with(&mut config.murf_voice_style, providers.murf_voice_style);
        override_with(&mut config.murf_sample_rate, providers.murf_sample_rate);
        override_opt(&mut config.murf_ws_url, providers.murf_ws_url);
        override_opt(&mut config.newsapi_key, providers.newsapi_key);
        override_opt(&mut config.newsapi_base_url, providers.newsapi_base_url);
        override_opt(&mut config.weather_api_key, providers.weather_api_key);
        override_opt(&mut config.weather_base_url, providers.weather_base_url);
    }

    if let Some(pipeline) = yaml.pipeline {
        override_with(&mut config.auto_assistant_reply, pipeline.auto_reply);
        override_with(&mut config.stt_timeout_secs, pipeline.stt_timeout_secs);
        override_with(&mut config.llm_timeout_secs, pipeline.llm_timeout_secs);
        override_with(&mut config.tts_timeout_secs, pipeline.tts_timeout_secs);
        override_with(
            &mut config.keep_partial_on_timeout,
            pipeline.keep_partial_on_timeout,
        );
        override_with(&mut config.jitter_buffer_ms, pipeline.jitter_buffer_ms);
        override_with(&mut config.stt_sample_rate, pipeline.stt_sample_rate);
        override_with(
            &mut config.end_of_turn_confidence_threshold,
            pipeline.end_of_turn_confidence_threshold,
        );
        override_with(
            &mut config.min_end_of_turn_silence_ms,
            pipeline.min_end_of_turn_silence_ms,
        );
        override_with(&mut config.max_turn_silence_ms, pipeline.max_turn_silence_ms);
        if let Some(retry) = pipeline.stt_retry {
            override_with(&mut config.stt_retry_max_attempts, retry.max_attempts);
            override_with(&mut config.stt_retry_initial_delay_ms, retry.initial_delay_ms);
            override_with(&mut config.stt_retry_max_delay_ms, retry.max_delay_ms);
        }
    }

    if let Some(session) = yaml.session {
        override_with(&mut config.history_max_messages, session.history_max_messages);
        override_with(&mut config.session_idle_ttl_secs, session.idle_ttl_secs);
        override_with(
            &mut config.session_sweep_interval_secs,
            session.sweep_interval_secs,
        );
        override_opt(&mut config.default_persona, session.default_persona);
    }

    if let Some(security) = yaml.security {
        override_opt(
            &mut config.cors_allowed_origins,
            security.cors_allowed_origins,
        );
        override_with(
            &mut config.rate_limit_requests_per_second,
            security.rate_limit_requests_per_second,
        );
        override_with(
            &mut config.rate_limit_burst_size,
            security.rate_limit_burst_size,
        );
        override_opt(
            &mut config.max_websocket_connections,
            security.max_websocket_connections,
        );
        override_with(
            &mut config.max_connections_per_ip,
            security.max_connections_per_ip,
        );
    }

    config.personas.extend(yaml.personas);

    Ok(config)
}

fn override_with<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn override_opt<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}
