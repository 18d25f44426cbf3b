//! Error types for pulse-reports
//!
//! Every failure leaves the service as `{"detail": <message>, "code": <KIND>}`.
//! `detail` is what existing dashboard clients read; `code` lets callers
//! branch on the kind without parsing the message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pulse_common::ErrorKind;
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Required query parameter absent or empty (400)
    #[error("Missing '{0}' parameter")]
    MissingParam(&'static str),

    /// Artifact absent, with a caller-facing message (404)
    #[error("{0}")]
    NotFound(String),

    /// Store, producer or key failure
    #[error(transparent)]
    Pulse(#[from] pulse_common::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingParam(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Pulse(e) => match e.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::InvalidKey => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingParam(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => ErrorKind::NotFound.code(),
            ApiError::Pulse(e) => e.kind().code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "detail": self.to_string(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
