//! pulse-reports library - report cache & orchestration service
//!
//! Serves analytical reports (provider insight analyses, cross-provider
//! comparisons, raw scraped data) from durable storage and runs the
//! expensive producers only when a report is missing or a refresh is asked
//! for. Concurrent requests for the same report share one production.

pub mod api;
pub mod error;
pub mod orchestrator;
pub mod producer;
pub mod store;

pub use crate::error::{ApiError, ApiResult};
pub use crate::orchestrator::CacheOrchestrator;
pub use crate::store::{Artifact, ArtifactStore, FsArtifactStore};

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Cache orchestrator (owns the in-flight ticket table)
    pub orchestrator: Arc<CacheOrchestrator>,
    /// Provider comparisons are made against
    pub comparison_baseline: String,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<CacheOrchestrator>, comparison_baseline: impl Into<String>) -> Self {
        Self {
            orchestrator,
            comparison_baseline: comparison_baseline.into(),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::report_routes())
        .merge(api::health_routes())
        .with_state(state)
}

/// CORS layer allowing the configured browser origins.
///
/// Origins that are not valid header values are skipped with a warning.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
