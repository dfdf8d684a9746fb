//! scoreshare-ingest library interface
//!
//! Chunked upload assembler for sheet-music PDFs. Exposes the pipeline
//! services and the HTTP router for the binary and for integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod storage;

pub use crate::error::{ApiError, ApiResult, UploadError, UploadResult};

use axum::{extract::DefaultBodyLimit, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::UploadConfig;
use crate::services::UploadCoordinator;
use crate::storage::BlobStore;

/// Room for multipart boundaries and the text fields around a full chunk
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Upload pipeline
    pub coordinator: Arc<UploadCoordinator>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: UploadConfig, blob_store: Arc<dyn BlobStore>) -> Self {
        Self::with_coordinator(Arc::new(UploadCoordinator::new(config, blob_store)))
    }

    /// State around an existing coordinator (shared with the stale sweeper)
    pub fn with_coordinator(coordinator: Arc<UploadCoordinator>) -> Self {
        Self {
            coordinator,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .coordinator
        .config()
        .max_chunk_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .merge(api::upload_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
