//! Error types for the asset store.
//!
//! Blob-affecting failures are surfaced to callers. Thumbnail and metadata
//! side effects that fail after a successful blob operation are logged and
//! swallowed by the service layer instead.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the asset store.
#[derive(Debug, Error)]
pub enum StoreError {
    // File system errors
    #[error("Not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Name already in use: {path}")]
    NameCollision { path: PathBuf },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Index errors
    #[error("Corrupt metadata index at {path}: {message}")]
    CorruptIndex { path: PathBuf, message: String },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Thumbnail errors
    #[error("Thumbnail rendering failed: {message}")]
    Renderer { message: String },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Other(format!("Background task failed: {}", err))
    }
}

impl StoreError {
    /// Create an IO error with path context.
    ///
    /// `NotFound` and `AlreadyExists` are mapped onto the dedicated variants
    /// so callers can match on them without inspecting the io kind.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound { path },
            std::io::ErrorKind::AlreadyExists => StoreError::NameCollision { path },
            _ => StoreError::Io {
                message: err.to_string(),
                path: Some(path),
                source: Some(err),
            },
        }
    }

    /// Errors that callers may treat as success (e.g. deleting twice).
    pub fn is_benign(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Check if the UI should offer a retry for this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Io { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::NameCollision {
            path: PathBuf::from("/assets/furniture/Armchair.usdz"),
        };
        assert_eq!(
            err.to_string(),
            "Name already in use: /assets/furniture/Armchair.usdz"
        );
    }

    #[test]
    fn test_io_with_path_maps_kinds() {
        let err = StoreError::io_with_path(
            std::io::Error::from(std::io::ErrorKind::NotFound),
            "/missing.usdz",
        );
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(err.is_benign());

        let err = StoreError::io_with_path(
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            "/locked.usdz",
        );
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(err.is_retryable());
        assert!(!err.is_benign());
    }

    #[test]
    fn test_renderer_errors_are_not_retryable() {
        let err = StoreError::Renderer {
            message: "unsupported mesh".into(),
        };
        assert!(!err.is_retryable());
        assert!(!err.is_benign());
    }
}
