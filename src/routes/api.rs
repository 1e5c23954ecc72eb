use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::api;
use crate::state::AppState;
use std::sync::Arc;

/// Create the HTTP router for health and session inspection
///
/// `GET /` is registered separately in main.rs.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(api::health_check))
        .route("/debug/persona/{session_id}", get(api::debug_persona))
        .route("/debug/chat/{session_id}", get(api::debug_chat))
        .route("/reset/{session_id}", post(api::reset_session))
        .layer(TraceLayer::new_for_http())
}
