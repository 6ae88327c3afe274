//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid collection path: {0}")]
    InvalidCollectionPath(String),

    #[error("invalid document path: {0}")]
    InvalidDocumentPath(String),

    #[error("invalid field path: {0}")]
    InvalidFieldPath(String),

    #[error("field {field} has unexpected type: expected {expected}, found {found}")]
    FieldType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
