//! Route tree.
//!
//! - `GET /metrics`: Prometheus text exposition
//! - `GET /health/live`: process liveness
//! - `GET /health/ready`: 200 once the first gateway token is held, 503 before

pub mod health;
pub mod metrics;

use axum::Router;

use crate::api::server::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .merge(metrics::router())
        .with_state(state)
}
