//! Error types for the sync layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tally_model::ModelError;
use tally_types::EntityKey;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type returned by service implementations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Message used when a failure carries no usable text.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred";

/// The service operation an outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Load,
    Get,
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Failures reported by an [`EntityService`](crate::EntityService).
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The server answered with an error status and a (possibly structured) body.
    #[error("request failed with status {status}")]
    Response { status: u16, body: Value },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The service does not implement the operation.
    #[error("operation not supported: {0}")]
    Unsupported(Operation),

    /// Any other failure, carrying its own message.
    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    /// Shorthand for a response failure.
    pub fn response(status: u16, body: Value) -> Self {
        Self::Response { status, body }
    }
}

/// Turns a service failure into the single display string the sync layer
/// stores and reports.
///
/// Prefers a structured `detail`, then `message`, from the response body;
/// falls back to the error's own text, then to [`GENERIC_ERROR_MESSAGE`].
pub fn normalize_message(error: &ServiceError) -> String {
    if let ServiceError::Response { body, .. } = error {
        for field in ["detail", "message"] {
            match body.get(field).and_then(Value::as_str) {
                Some(text) if !text.trim().is_empty() => return text.to_string(),
                _ => {}
            }
        }
    }

    let text = error.to_string();
    if text.trim().is_empty() {
        GENERIC_ERROR_MESSAGE.to_string()
    } else {
        text
    }
}

/// A normalized operation failure, as handed to error callbacks and
/// returned from mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {message}")]
pub struct CrudError {
    pub operation: Operation,
    /// Display-ready message; identical to what lands in the state's error slot.
    pub message: String,
    /// Best-effort code: the body's `code` field, else the HTTP status.
    pub code: Option<String>,
}

impl CrudError {
    /// Normalizes a service failure for `operation`.
    pub fn from_service(operation: Operation, error: &ServiceError) -> Self {
        let code = match error {
            ServiceError::Response { status, body } => Some(
                body.get("code")
                    .and_then(|c| match c {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .unwrap_or_else(|| status.to_string()),
            ),
            _ => None,
        };

        Self {
            operation,
            message: normalize_message(error),
            code,
        }
    }
}

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A service call failed; already recorded in the owning state.
    #[error(transparent)]
    Operation(#[from] CrudError),

    /// A record lacks a string/integer identity.
    #[error("invalid identity in field `{field}`: found {found}")]
    InvalidIdentity { field: String, found: String },

    /// Patch or response shape error.
    #[error("model error: {0}")]
    Model(ModelError),

    /// A monetary field could not be read or summed.
    #[error("amount error: {0}")]
    Amount(#[from] tally_types::Error),

    /// No record with this key is held.
    #[error("entity not found: {0}")]
    NotFound(EntityKey),

    /// The confirmation gate rejects concurrent prompts.
    #[error("a confirmation is already pending")]
    GateBusy,

    /// The gate was dropped before a decision was made.
    #[error("confirmation gate closed before a decision was made")]
    GateClosed,

    /// The confirm side effect failed; the prompt stays open.
    #[error("confirm action failed: {0}")]
    ConfirmFailed(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// The normalized operation failure, if this is one.
    pub fn as_crud(&self) -> Option<&CrudError> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Display-ready message: the normalized message for operation
    /// failures, the error text otherwise.
    pub fn message(&self) -> String {
        match self {
            Self::Operation(e) => e.message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<ModelError> for SyncError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InvalidIdentity { field, found } => Self::InvalidIdentity { field, found },
            ModelError::Serialization(e) => Self::Serialization(e),
            other => Self::Model(other),
        }
    }
}
