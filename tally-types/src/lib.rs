//! Core type definitions for the Tally client sync layer.
//!
//! This crate defines the small, resource-agnostic types shared by the
//! model and sync crates:
//! - Record identity ([`EntityKey`]): a string or integer scalar
//! - Partition ("profile") and prompt identifiers
//! - Fixed-point monetary amounts ([`Amount`])
//!
//! Resource shapes (accounts, transactions, budgets, goals) belong to the
//! generated bindings of the application, not here.

mod amount;
mod ids;

pub use amount::{Amount, AMOUNT_SCALE};
pub use ids::{EntityKey, PartitionId, PromptId};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("amount overflow")]
    AmountOverflow,
}
