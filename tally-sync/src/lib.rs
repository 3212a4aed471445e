//! Client-side data synchronization layer for Tally.
//!
//! Keeps local collections of server records consistent with a remote
//! service across loads, creates, updates and deletes.
//!
//! # Architecture
//!
//! Every component is resource-agnostic: records are any
//! [`Record`](tally_model::Record), and everything resource-specific is
//! supplied by the caller through a narrow trait.
//!
//! ## Components
//!
//! - **Container**: one collection bound to an [`EntityService`], with busy
//!   flags, an error slot, selection and an optional page cursor
//! - **State**: the pure reducer every container change goes through
//! - **Optimistic**: speculative updates/deletes with rollback on failure
//! - **Cache**: keyed query cache with retry, staleness and invalidation
//! - **Aggregator**: one query per partition (profile), merged into one view
//! - **Mutation**: write wrappers that invalidate dependent queries
//! - **Confirm**: an async accept/decline gate for destructive actions
//!
//! ## Failure reporting
//!
//! Service failures are normalized once, by [`normalize_message`], into the
//! string a UI shows. Loads record failures in the container's error slot
//! and never return them; writes record and return them.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tally_sync::{ContainerConfig, EntityContainer, MockService};
//!
//! # #[derive(Clone, serde::Serialize, serde::Deserialize)]
//! # struct Account { id: i64, name: String }
//! let service = Arc::new(MockService::<Account>::new());
//! let accounts = EntityContainer::<Account>::new(service, ContainerConfig::default());
//! assert!(accounts.items().is_empty());
//! ```

pub mod aggregator;
pub mod cache;
pub mod confirm;
mod config;
pub mod container;
mod error;
pub mod mutation;
pub mod optimistic;
pub mod service;
pub mod state;

pub use aggregator::{
    sum_amounts, sum_fields, sum_floats, AggregatedResult, PartitionQuery, QueryAggregator,
    ServicePartitions, SumMode,
};
pub use cache::{CacheConfig, QueryClient, QueryKey};
pub use config::SyncLayerConfig;
pub use confirm::{
    ConfirmOptions, ConfirmationGate, GateConfig, GatePolicy, PromptDisplay, PromptView, Variant,
};
pub use container::{
    ContainerConfig, CrudCallbacks, EntityContainer, ErrorCallbacks, SuccessCallbacks,
};
pub use error::{
    normalize_message, CrudError, Operation, ServiceError, ServiceResult, SyncError, SyncResult,
    GENERIC_ERROR_MESSAGE,
};
pub use mutation::{
    CreateArgs, DeleteArgs, Mutation, MutationArgs, MutationFactory, MutationFn, UpdateArgs,
};
pub use optimistic::{OptimisticConfig, OptimisticCoordinator};
pub use service::mock::{MockCall, MockService};
pub use service::{Capabilities, EntityService};
pub use state::{reduce, Busy, CrudAction, CrudState};
