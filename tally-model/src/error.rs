//! Error types for the record model.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while reading or rewriting records.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The identity field is missing or not a string/integer.
    #[error("invalid identity in field `{field}`: found {found}")]
    InvalidIdentity { field: String, found: String },

    /// A patch was not a JSON object, or the record is not one.
    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
