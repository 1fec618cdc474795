//! Plain HTTP handlers.

use axum::Json;
use axum::response::IntoResponse;
use serde_json::json;

/// Health check endpoint.
///
/// Unauthenticated liveness probe for load balancers and orchestrators.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
