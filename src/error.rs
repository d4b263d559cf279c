//! Error taxonomy for catalog and storage operations.

use thiserror::Error;

/// Errors that can occur across the catalog, storage and reconciliation layers
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("Storage I/O error at {path}: {source}")]
    StorageIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CatalogError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn storage_io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::StorageIo {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the crate
pub type Result<T, E = CatalogError> = std::result::Result<T, E>;
