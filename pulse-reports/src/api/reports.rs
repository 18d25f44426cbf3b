//! Report endpoints
//!
//! Each endpoint builds a structured [`ArtifactKey`] from its parameters and
//! makes exactly one orchestrator call. Filename parameters are parsed into
//! keys too, so no raw client string ever reaches the filesystem.
//!
//! Producing endpoints serve the stored artifact when one exists; pass
//! `refresh=true` (or use `POST /refresh`) to recompute.

use axum::{
    extract::{Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use pulse_common::{ArtifactKey, ArtifactKind, Error, Namespace};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::store::Artifact;
use crate::AppState;

/// `?service=<name>[&refresh=true]`
#[derive(Debug, Deserialize)]
pub struct ServiceQuery {
    pub service: Option<String>,
    #[serde(default)]
    pub refresh: bool,
}

/// `?refresh=true`
#[derive(Debug, Deserialize)]
pub struct RefreshFlag {
    #[serde(default)]
    pub refresh: bool,
}

/// `?filename=<name>.json`
#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub filename: Option<String>,
}

/// `?kind=<analysis|comparison|scraped>[&service=<name>]`
#[derive(Debug, Deserialize)]
pub struct RefreshQuery {
    pub kind: Option<String>,
    pub service: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub deleted: bool,
}

fn required(value: Option<String>, name: &'static str) -> ApiResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::MissingParam(name)),
    }
}

fn comparison_key(state: &AppState) -> ApiResult<ArtifactKey> {
    Ok(ArtifactKey::comparison(&state.comparison_baseline)?)
}

/// GET /analyze?service=<name>
pub async fn analyze(
    State(state): State<AppState>,
    Query(query): Query<ServiceQuery>,
) -> ApiResult<Artifact> {
    let service = required(query.service, "service")?;
    let key = ArtifactKey::analysis(&service)?;
    info!("Analysis requested for {} (refresh: {})", key.service(), query.refresh);

    Ok(state.orchestrator.get_or_produce(&key, query.refresh).await?)
}

/// GET /compare_metrics
pub async fn compare_metrics(
    State(state): State<AppState>,
    Query(query): Query<RefreshFlag>,
) -> ApiResult<Artifact> {
    let key = comparison_key(&state)?;
    info!("Comparison requested against {} (refresh: {})", state.comparison_baseline, query.refresh);

    Ok(state.orchestrator.get_or_produce(&key, query.refresh).await?)
}

/// GET /check_report?filename=<name>.json
///
/// A filename that cannot name a report simply does not exist.
pub async fn check_report(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> ApiResult<Json<ExistsResponse>> {
    let filename = required(query.filename, "filename")?;
    let exists = match ArtifactKey::from_filename(Namespace::Reports, &filename) {
        Ok(key) => state.orchestrator.peek(&key).await,
        Err(e) => {
            debug!("check_report for unusable filename: {}", e);
            false
        }
    };

    Ok(Json(ExistsResponse { exists }))
}

/// GET /get_report?filename=<name>.json
pub async fn get_report(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> ApiResult<Artifact> {
    let filename = required(query.filename, "filename")?;
    let key = ArtifactKey::from_filename(Namespace::Reports, &filename)?;

    match state.orchestrator.read(&key).await {
        Err(Error::NotFound(_)) => Err(ApiError::NotFound("Report not found".to_string())),
        other => Ok(other?),
    }
}

/// GET /get_scraped_data?filename=<name>.json
pub async fn get_scraped_data(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> ApiResult<Artifact> {
    let filename = required(query.filename, "filename")?;
    let key = ArtifactKey::from_filename(Namespace::ScrapedData, &filename)?;

    match state.orchestrator.read(&key).await {
        Err(Error::NotFound(_)) => Err(ApiError::NotFound("Scraped data not found".to_string())),
        other => Ok(other?),
    }
}

/// DELETE /delete_report?filename=<name>.json
pub async fn delete_report(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> ApiResult<Json<DeleteResponse>> {
    let filename = required(query.filename, "filename")?;
    let key = ArtifactKey::from_filename(Namespace::Reports, &filename)?;

    let deleted = state.orchestrator.invalidate(&key).await?;
    let message = if deleted {
        format!("Report {} deleted successfully", filename)
    } else {
        format!("Report {} does not exist", filename)
    };

    Ok(Json(DeleteResponse { message, deleted }))
}

/// GET /ensure_scraped_data?service=<name>
pub async fn ensure_scraped_data(
    State(state): State<AppState>,
    Query(query): Query<ServiceQuery>,
) -> ApiResult<Artifact> {
    let service = required(query.service, "service")?;
    let key = ArtifactKey::scraped(&service)?;
    info!("Scraped data requested for {} (refresh: {})", key.service(), query.refresh);

    Ok(state.orchestrator.get_or_produce(&key, query.refresh).await?)
}

/// POST /refresh?kind=<kind>[&service=<name>]
///
/// Recompute and store an artifact regardless of what is cached.
pub async fn refresh(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<Artifact> {
    let kind: ArtifactKind = required(query.kind, "kind")?.parse()?;
    let key = if kind.is_per_service() {
        let service = required(query.service, "service")?;
        ArtifactKey::new(kind, &service, None)?
    } else {
        comparison_key(&state)?
    };
    info!("Explicit refresh of {}", key);

    Ok(state.orchestrator.get_or_produce(&key, true).await?)
}

/// Build report routes
pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/analyze", get(analyze))
        .route("/compare_metrics", get(compare_metrics))
        .route("/check_report", get(check_report))
        .route("/get_report", get(get_report))
        .route("/get_scraped_data", get(get_scraped_data))
        .route("/delete_report", delete(delete_report))
        .route("/ensure_scraped_data", get(ensure_scraped_data))
        .route("/refresh", post(refresh))
}
