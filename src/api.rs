//! HTTP endpoints for liveness checks.
//!
//! These carry no chat semantics; they exist so deploy tooling can probe
//! the process.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub connections: usize,
    pub environment: String,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP",
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        connections: state.registry.connection_count().await,
        environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub server: &'static str,
    pub timestamp: i64,
    pub version: &'static str,
}

/// GET /api/status
pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        server: "online",
        timestamp: chrono::Utc::now().timestamp_millis(),
        version: env!("CARGO_PKG_VERSION"),
    })
}
