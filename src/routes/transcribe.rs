//! Transcription WebSocket route configuration.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::transcribe::transcribe_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the transcription WebSocket router.
///
/// # Endpoint
///
/// `GET /transcribe` - WebSocket upgrade for real-time transcription
///
/// # Protocol
///
/// After the upgrade, clients send:
/// 1. `{"type": "start_transcription"}` to open a session
/// 2. Binary audio frames (PCM 16-bit, 44.1kHz, mono)
/// 3. `{"type": "stop_transcription"}` to end it
///
/// The server responds with:
/// - `{"type": "transcription", "text": "...", "is_final": false}` deltas
/// - `{"type": "error", "message": "..."}` on failures
pub fn create_transcribe_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/transcribe", get(transcribe_handler))
        .layer(TraceLayer::new_for_http())
}
