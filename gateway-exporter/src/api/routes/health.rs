//! Health check routes.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};

use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/live", get(liveness_check))
        .route("/ready", get(readiness_check))
}

/// Readiness check: can the exporter talk to the gateway yet?
/// Returns HTTP 200 once the first token is held, HTTP 503 before.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.credentials.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

/// Liveness check with uptime and token freshness.
async fn liveness_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": uptime,
            "token_refreshed_at": state.credentials.last_refreshed_at(),
            "token_refresh_failures": state.credentials.consecutive_failures(),
        })),
    )
}
