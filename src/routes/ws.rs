//! Voice stream WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::voice::ws_stream_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the voice stream WebSocket router
///
/// # Endpoint
///
/// `GET /ws/stream` - WebSocket upgrade for a voice session
///
/// # Query parameters
///
/// - `session` - session id to create or resume (default `anon-<unix>`)
/// - `aai`, `gemini`, `murf`, `news`, `weather` - per-session API keys
/// - `persona` - persona name
/// - `sample_rate`, `encoding` - format of the binary audio frames
///
/// Connection limits are applied in main.rs once state is available.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/stream", get(ws_stream_handler))
        .layer(TraceLayer::new_for_http())
}
