//! Error types for vector-export.

use thiserror::Error;

/// Result type alias for export operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while exporting a collection.
///
/// None of these are retried: every variant propagates to the caller and
/// terminates the export of the affected collection.
#[derive(Error, Debug)]
pub enum Error {
    /// Credentials were missing or rejected by the backend.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The backend could not be reached or answered with a failure status.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The named collection, index or class does not exist.
    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    /// Writing to the local tabular store or columnar file failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A backend response had an unexpected or missing field shape.
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parse error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(format!("SQLite: {err}"))
    }
}

impl From<arrow::error::ArrowError> for Error {
    fn from(err: arrow::error::ArrowError) -> Self {
        Self::Persistence(format!("Arrow: {err}"))
    }
}

impl From<parquet::errors::ParquetError> for Error {
    fn from(err: parquet::errors::ParquetError) -> Self {
        Self::Persistence(format!("Parquet: {err}"))
    }
}

impl Error {
    /// Whether the error came from the local sink rather than the backend.
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::CollectionNotFound("docs".to_string()).to_string(),
            "Collection 'docs' not found"
        );
        assert_eq!(
            Error::Authentication("bad key".to_string()).to_string(),
            "Authentication error: bad key"
        );
    }

    #[test]
    fn test_sqlite_errors_map_to_persistence() {
        let err: Error = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, Error::Persistence(_)));
        assert!(err.is_persistence());
    }

    #[test]
    fn test_backend_errors_are_not_persistence() {
        assert!(!Error::BackendUnavailable("down".to_string()).is_persistence());
        assert!(!Error::Normalization("shape".to_string()).is_persistence());
    }
}
