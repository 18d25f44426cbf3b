//! Common error types for Pulse

use std::time::Duration;

use thiserror::Error;

use crate::key::ArtifactKind;

/// Common result type for Pulse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the artifact store, producers and cache orchestrator.
///
/// `Clone` because a single production outcome is delivered to every request
/// that joined the same in-flight ticket.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed service/kind/filename; raised before any filesystem access
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Requested artifact is not in the store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored bytes are not a valid JSON artifact
    #[error("Corrupt data: {0}")]
    CorruptData(String),

    /// I/O fault while touching the storage root
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Producer raised or returned an error
    #[error("Production failed for {kind}/{service}: {cause}")]
    ProductionFailed {
        kind: ArtifactKind,
        service: String,
        cause: String,
    },

    /// Producer did not finish within the configured deadline
    #[error("Production timed out for {kind}/{service} after {after:?}")]
    ProductionTimeout {
        kind: ArtifactKind,
        service: String,
        after: Duration,
    },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Discriminant of [`Error`] so callers can branch without matching on text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidKey,
    NotFound,
    CorruptData,
    StorageUnavailable,
    ProductionFailed,
    ProductionTimeout,
    Config,
}

impl ErrorKind {
    /// Stable machine-readable code used in API error bodies
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidKey => "INVALID_KEY",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::CorruptData => "CORRUPT_DATA",
            ErrorKind::StorageUnavailable => "STORAGE_UNAVAILABLE",
            ErrorKind::ProductionFailed => "PRODUCTION_FAILED",
            ErrorKind::ProductionTimeout => "PRODUCTION_TIMEOUT",
            ErrorKind::Config => "CONFIG_ERROR",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidKey(_) => ErrorKind::InvalidKey,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::CorruptData(_) => ErrorKind::CorruptData,
            Error::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            Error::ProductionFailed { .. } => ErrorKind::ProductionFailed,
            Error::ProductionTimeout { .. } => ErrorKind::ProductionTimeout,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
