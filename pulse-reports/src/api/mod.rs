//! HTTP API handlers for pulse-reports

pub mod health;
pub mod reports;

use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::store::Artifact;

pub use health::health_routes;
pub use reports::report_routes;

impl IntoResponse for Artifact {
    fn into_response(self) -> Response {
        Json(self.value()).into_response()
    }
}
