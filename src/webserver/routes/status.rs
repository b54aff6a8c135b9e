use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::logger::{self, LogTag};
use crate::webserver::state::AppState;
use crate::webserver::utils::success_response;

/// Liveness response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub uptime_seconds: i64,
}

/// GET /api/health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    logger::verbose(LogTag::Webserver, "Health check endpoint called");

    success_response(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}
