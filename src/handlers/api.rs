//! Health and session inspection endpoints.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::core::session::{Capability, Persona, SessionSnapshot};
use crate::errors::AppResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub stt: bool,
    pub llm: bool,
    pub tts: bool,
    pub news: bool,
    pub weather: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Whether a process-wide default key exists per capability
    pub services: ServiceStatus,
    pub sessions: usize,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config = &state.config;
    Json(HealthResponse {
        status: "ok",
        services: ServiceStatus {
            stt: config.has_default_key(Capability::Stt),
            llm: config.has_default_key(Capability::Llm),
            tts: config.has_default_key(Capability::Tts),
            news: config.has_default_key(Capability::News),
            weather: config.has_default_key(Capability::Weather),
        },
        sessions: state.sessions.len(),
    })
}

#[derive(Debug, Serialize)]
pub struct PersonaDebugResponse {
    pub session_id: String,
    pub persona: Persona,
    pub available_personas: Vec<String>,
    pub history_length: usize,
}

pub async fn debug_persona(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> AppResult<Json<PersonaDebugResponse>> {
    let session = state.sessions.get(&session_id)?;
    Ok(Json(PersonaDebugResponse {
        session_id,
        persona: session.persona(),
        available_personas: state.sessions.personas().names(),
        history_length: session.history_len(),
    }))
}

/// Snapshot of a session. Credentials are reported by provider name only.
pub async fn debug_chat(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> AppResult<Json<SessionSnapshot>> {
    Ok(Json(state.sessions.debug_snapshot(&session_id)?))
}

pub async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.sessions.reset(&session_id)?;
    tracing::info!(session_id = %session_id, "Session reset");
    Ok(Json(json!({
        "message": format!("Session {session_id} reset successfully")
    })))
}
