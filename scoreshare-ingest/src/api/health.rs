//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok" or "degraded")
    pub status: String,
    /// Module name ("scoreshare-ingest")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Upload sessions currently staged
    pub active_sessions: usize,
    /// Sessions with a request being processed right now
    pub in_flight_sessions: usize,
}

/// GET /health
///
/// Reports "degraded" when the staging area cannot be listed.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let (status, active_sessions) = match state.coordinator.chunk_store().list_sessions().await {
        Ok(sessions) => ("ok", sessions.len()),
        Err(e) => {
            tracing::warn!("Health check could not list staging sessions: {}", e);
            ("degraded", 0)
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        module: "scoreshare-ingest".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        active_sessions,
        in_flight_sessions: state.coordinator.in_flight_sessions(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
