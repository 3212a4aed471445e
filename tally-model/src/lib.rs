//! Record model for the Tally sync layer.
//!
//! Defines the resource-agnostic types the sync crate is generic over:
//! - [`Record`]: any serializable entity shape handed out by the service
//! - [`IdField`]: where a record keeps its scalar identity
//! - [`merge_patch`]: shallow field-by-field patch application
//! - [`QueryParams`], [`ListResponse`], [`Pagination`]: list requests and
//!   the shapes a list endpoint may answer with
//!
//! Resource bindings (accounts, transactions, budgets, goals) only need to
//! derive `Serialize`/`Deserialize` to plug in.

mod entity;
mod error;
mod patch;
mod query;

pub use entity::{IdField, Record};
pub use error::{ModelError, ModelResult};
pub use patch::merge_patch;
pub use query::{ListResponse, Pagination, QueryParams};
