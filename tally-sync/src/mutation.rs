//! Mutation wrappers.
//!
//! A [`Mutation`] runs one write operation, tracks whether it is pending and
//! what its last error was, and invalidates a cache prefix when it succeeds
//! so that dependent aggregated views refetch. Failures are never retried.

use crate::cache::{QueryClient, QueryKey};
use crate::error::{CrudError, Operation, ServiceResult, SyncResult};
use crate::service::EntityService;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tally_model::{QueryParams, Record};
use tally_types::EntityKey;
use tracing::{debug, warn};

/// The operation a mutation performs.
pub type MutationFn<A, R> = Arc<dyn Fn(A) -> BoxFuture<'static, ServiceResult<R>> + Send + Sync>;

/// Arguments of a create mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateArgs {
    pub data: Value,
}

/// Arguments of an update mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateArgs {
    pub id: EntityKey,
    pub data: Value,
}

/// Arguments of a delete mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteArgs {
    pub id: EntityKey,
}

/// Mutation arguments that can be flattened into one endpoint parameter
/// object.
pub trait MutationArgs: Send + 'static {
    /// The operation these arguments belong to.
    const OPERATION: Operation;

    /// Request parameters, with the id (if any) under `id_param`.
    fn into_params(self, id_param: &str) -> QueryParams;
}

impl MutationArgs for CreateArgs {
    const OPERATION: Operation = Operation::Create;

    fn into_params(self, _id_param: &str) -> QueryParams {
        QueryParams::new().with("data", self.data)
    }
}

impl MutationArgs for UpdateArgs {
    const OPERATION: Operation = Operation::Update;

    fn into_params(self, id_param: &str) -> QueryParams {
        QueryParams::new()
            .with(id_param, self.id.to_json())
            .with("data", self.data)
    }
}

impl MutationArgs for DeleteArgs {
    const OPERATION: Operation = Operation::Delete;

    fn into_params(self, id_param: &str) -> QueryParams {
        QueryParams::new().with(id_param, self.id.to_json())
    }
}

#[derive(Default)]
struct MutationState {
    pending: usize,
    error: Option<String>,
}

/// One write operation with pending/error tracking and cache invalidation.
pub struct Mutation<A, R> {
    name: String,
    operation: Operation,
    run: MutationFn<A, R>,
    cache: QueryClient,
    invalidates: Vec<QueryKey>,
    state: Arc<Mutex<MutationState>>,
}

impl<A, R> Clone for Mutation<A, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            operation: self.operation,
            run: self.run.clone(),
            cache: self.cache.clone(),
            invalidates: self.invalidates.clone(),
            state: self.state.clone(),
        }
    }
}

impl<A: Send + 'static, R: Send + 'static> Mutation<A, R> {
    /// Wraps `run`; a success invalidates everything under `target`.
    pub fn new(
        name: impl Into<String>,
        operation: Operation,
        run: MutationFn<A, R>,
        cache: QueryClient,
        target: QueryKey,
    ) -> Self {
        Self {
            name: name.into(),
            operation,
            run,
            cache,
            invalidates: vec![target],
            state: Arc::new(Mutex::new(MutationState::default())),
        }
    }

    /// Also invalidates `key` on success.
    #[must_use]
    pub fn also_invalidates(mut self, key: QueryKey) -> Self {
        self.invalidates.push(key);
        self
    }

    /// Binds an endpoint that takes a single parameter object.
    ///
    /// The id, if the arguments carry one, is placed under `id_param`.
    pub fn from_endpoint<E, Fut>(
        name: impl Into<String>,
        endpoint: E,
        id_param: impl Into<String>,
        cache: QueryClient,
        target: QueryKey,
    ) -> Self
    where
        A: MutationArgs,
        E: Fn(QueryParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult<R>> + Send + 'static,
    {
        let id_param = id_param.into();
        let run: MutationFn<A, R> = Arc::new(move |args: A| {
            let params = args.into_params(&id_param);
            endpoint(params).boxed()
        });
        Self::new(name, A::OPERATION, run, cache, target)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a run is in flight.
    pub fn is_pending(&self) -> bool {
        self.state.lock().pending > 0
    }

    /// Message of the last failed run.
    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    /// Clears the last error.
    pub fn reset(&self) {
        self.state.lock().error = None;
    }

    /// Runs the mutation.
    ///
    /// On success the invalidation targets are broadcast before this
    /// returns; listeners refetch on their own time.
    pub async fn run(&self, args: A) -> SyncResult<R> {
        let pending = Pending::start(&self.state);
        let result = (self.run)(args).await;
        drop(pending);

        match result {
            Ok(value) => {
                for key in &self.invalidates {
                    self.cache.invalidate(key);
                }
                debug!("Mutation {} succeeded", self.name);
                Ok(value)
            }
            Err(err) => {
                let error = CrudError::from_service(self.operation, &err);
                warn!("Mutation {} failed: {}", self.name, error.message);
                self.state.lock().error = Some(error.message.clone());
                Err(error.into())
            }
        }
    }
}

/// Raises the pending count for the life of one run.
struct Pending<'a> {
    state: &'a Mutex<MutationState>,
}

impl<'a> Pending<'a> {
    fn start(state: &'a Mutex<MutationState>) -> Self {
        let mut guard = state.lock();
        guard.pending += 1;
        guard.error = None;
        Self { state }
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        let mut guard = self.state.lock();
        guard.pending = guard.pending.saturating_sub(1);
    }
}

/// Builds create/update/delete mutations over one service.
pub struct MutationFactory<T: Record> {
    service: Arc<dyn EntityService<T>>,
    cache: QueryClient,
    target: QueryKey,
    resource: String,
}

impl<T: Record> MutationFactory<T> {
    /// Mutations built here invalidate `target` on success.
    pub fn new(
        resource: impl Into<String>,
        service: Arc<dyn EntityService<T>>,
        cache: QueryClient,
        target: QueryKey,
    ) -> Self {
        Self {
            service,
            cache,
            target,
            resource: resource.into(),
        }
    }

    pub fn create(&self) -> Mutation<CreateArgs, T> {
        let service = self.service.clone();
        let run: MutationFn<CreateArgs, T> = Arc::new(move |args: CreateArgs| {
            let service = service.clone();
            async move { service.create(args.data).await }.boxed()
        });
        self.build(Operation::Create, run)
    }

    pub fn update(&self) -> Mutation<UpdateArgs, T> {
        let service = self.service.clone();
        let run: MutationFn<UpdateArgs, T> = Arc::new(move |args: UpdateArgs| {
            let service = service.clone();
            async move { service.update(&args.id, args.data).await }.boxed()
        });
        self.build(Operation::Update, run)
    }

    pub fn delete(&self) -> Mutation<DeleteArgs, ()> {
        let service = self.service.clone();
        let run: MutationFn<DeleteArgs, ()> = Arc::new(move |args: DeleteArgs| {
            let service = service.clone();
            async move { service.delete(&args.id).await }.boxed()
        });
        self.build(Operation::Delete, run)
    }

    fn build<A: Send + 'static, R: Send + 'static>(
        &self,
        operation: Operation,
        run: MutationFn<A, R>,
    ) -> Mutation<A, R> {
        if !self.service.capabilities().supports(operation) {
            warn!(
                "{} mutation built for {} but the service does not support it",
                operation, self.resource
            );
        }
        Mutation::new(
            format!("{}.{}", self.resource, operation),
            operation,
            run,
            self.cache.clone(),
            self.target.clone(),
        )
    }
}
