//! Configuration validation logic.

use super::ServerConfig;

/// Reject values the pipeline cannot run with.
pub(super) fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    for (name, value) in [
        ("STT_TIMEOUT_SEC", config.stt_timeout_secs),
        ("LLM_TIMEOUT_SEC", config.llm_timeout_secs),
        ("TTS_TIMEOUT_SEC", config.tts_timeout_secs),
    ] {
        if value == 0 {
            return Err(format!("{name} must be greater than 0").into());
        }
    }

    if config.history_max_messages == 0 {
        return Err("HISTORY_MAX_MESSAGES must be greater than 0".into());
    }

    if !(0.0..=1.0).contains(&config.end_of_turn_confidence_threshold) {
        return Err(format!(
            "END_OF_TURN_CONFIDENCE_THRESHOLD must be between 0 and 1, got {}",
            config.end_of_turn_confidence_threshold
        )
        .into());
    }

    if config.stt_sample_rate == 0 || config.murf_sample_rate == 0 {
        return Err("Sample rates must be greater than 0".into());
    }

    if config.session_idle_ttl_secs > 0 && config.session_sweep_interval_secs == 0 {
        return Err(
            "SESSION_SWEEP_INTERVAL_SECS must be greater than 0 when session expiry is enabled"
                .into(),
        );
    }

    if config.rate_limit_requests_per_second == 0 || config.rate_limit_burst_size == 0 {
        return Err("Rate limit values must be greater than 0".into());
    }

    if config.max_connections_per_ip == 0 {
        return Err("MAX_CONNECTIONS_PER_IP must be greater than 0".into());
    }

    if let Some(tls) = &config.tls {
        if !tls.cert_path.exists() {
            return Err(format!(
                "TLS certificate file not found: {}",
                tls.cert_path.display()
            )
            .into());
        }
        if !tls.key_path.exists() {
            return Err(format!("TLS key file not found: {}", tls.key_path.display()).into());
        }
    }

    config.persona_catalog().map_err(|e| e.to_string())?;

    Ok(())
}
