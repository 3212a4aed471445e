//! Entity CRUD container: one collection of records bound to a service.
//!
//! The container owns a [`CrudState`] and turns each imperative action into
//! reducer dispatches around a service call. The state lock is never held
//! across an `.await`: an action's writes are atomic, but actions are not
//! serialized against each other, and whichever settles last writes last.

use crate::error::{CrudError, Operation, ServiceError, SyncError, SyncResult};
use crate::service::EntityService;
use crate::state::{reduce, Busy, CrudAction, CrudState};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tally_model::{IdField, Pagination, QueryParams, Record};
use tally_types::EntityKey;
use tracing::{debug, info, warn};

/// Configuration for a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Field carrying each record's identity.
    pub id_field: IdField,
    /// Parameters sent with every load, below call-site parameters.
    pub default_params: QueryParams,
    /// Whether loads are paged (`{data, total}` responses).
    pub paginated: bool,
    /// Page size of the initial cursor when paginated.
    pub page_size: u32,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            id_field: IdField::default(),
            default_params: QueryParams::new(),
            paginated: false,
            page_size: 20,
        }
    }
}

pub type LoadHook<T> = Arc<dyn Fn(&[T]) + Send + Sync>;
pub type EntityHook<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub type KeyHook = Arc<dyn Fn(&EntityKey) + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&CrudError) + Send + Sync>;

/// Hooks run after a successful action, once state is updated.
pub struct SuccessCallbacks<T> {
    pub load: Option<LoadHook<T>>,
    pub create: Option<EntityHook<T>>,
    pub update: Option<EntityHook<T>>,
    pub delete: Option<KeyHook>,
}

/// Hooks run after a failed action, once the error slot is set.
#[derive(Clone, Default)]
pub struct ErrorCallbacks {
    pub load: Option<ErrorHook>,
    pub create: Option<ErrorHook>,
    pub update: Option<ErrorHook>,
    pub delete: Option<ErrorHook>,
}

impl ErrorCallbacks {
    fn get(&self, operation: Operation) -> Option<&ErrorHook> {
        match operation {
            Operation::Load => self.load.as_ref(),
            Operation::Create => self.create.as_ref(),
            Operation::Update => self.update.as_ref(),
            Operation::Delete => self.delete.as_ref(),
            Operation::Get => None,
        }
    }
}

impl<T> Default for SuccessCallbacks<T> {
    fn default() -> Self {
        Self {
            load: None,
            create: None,
            update: None,
            delete: None,
        }
    }
}

impl<T> Clone for SuccessCallbacks<T> {
    fn clone(&self) -> Self {
        Self {
            load: self.load.clone(),
            create: self.create.clone(),
            update: self.update.clone(),
            delete: self.delete.clone(),
        }
    }
}

/// Success and error hooks of a container.
pub struct CrudCallbacks<T> {
    pub on_success: SuccessCallbacks<T>,
    pub on_error: ErrorCallbacks,
}

impl<T> Default for CrudCallbacks<T> {
    fn default() -> Self {
        Self {
            on_success: SuccessCallbacks::default(),
            on_error: ErrorCallbacks::default(),
        }
    }
}

impl<T> Clone for CrudCallbacks<T> {
    fn clone(&self) -> Self {
        Self {
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

/// Holds one collection of records in sync with an [`EntityService`].
pub struct EntityContainer<T: Record> {
    service: Arc<dyn EntityService<T>>,
    config: ContainerConfig,
    callbacks: CrudCallbacks<T>,
    state: RwLock<CrudState<T>>,
}

impl<T: Record> EntityContainer<T> {
    /// Creates a container over `service`.
    pub fn new(service: Arc<dyn EntityService<T>>, config: ContainerConfig) -> Self {
        let state = CrudState::new(Self::initial_pagination(&config));
        Self {
            service,
            config,
            callbacks: CrudCallbacks::default(),
            state: RwLock::new(state),
        }
    }

    /// Sets the success/error hooks.
    #[must_use]
    pub fn with_callbacks(mut self, callbacks: CrudCallbacks<T>) -> Self {
        self.callbacks = callbacks;
        self
    }

    fn initial_pagination(config: &ContainerConfig) -> Option<Pagination> {
        config
            .paginated
            .then(|| Pagination::new(1, config.page_size))
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn id_field(&self) -> &IdField {
        &self.config.id_field
    }

    /// Whether the bound service implements `operation`.
    pub fn supports(&self, operation: Operation) -> bool {
        self.service.capabilities().supports(operation)
    }

    /// Reads a record's identity with this container's id field.
    pub fn key_of(&self, item: &T) -> SyncResult<EntityKey> {
        Ok(self.config.id_field.key_of(item)?)
    }

    // ── Snapshots ────────────────────────────────────────────────

    /// A copy of the current state.
    pub fn state(&self) -> CrudState<T> {
        self.state.read().clone()
    }

    pub fn items(&self) -> Vec<T> {
        self.state.read().items().to_vec()
    }

    pub fn find(&self, key: &EntityKey) -> Option<T> {
        self.state.read().find(key).cloned()
    }

    pub fn error(&self) -> Option<String> {
        self.state.read().error().map(str::to_string)
    }

    pub fn selected_item(&self) -> Option<T> {
        self.state.read().selected_item().cloned()
    }

    // ── Network actions ──────────────────────────────────────────

    /// Loads the collection.
    ///
    /// A failed load keeps the current items and records the error; it is
    /// reported through the error slot and `on_error.load`, not returned.
    /// Only a record without a scalar identity makes this return `Err`.
    pub async fn load(&self, params: Option<QueryParams>) -> SyncResult<()> {
        if !self.supports(Operation::Load) {
            warn!("load requested but the service has no list operation; ignoring");
            return Ok(());
        }

        let request = self.request_params(params.as_ref());
        let guard = self.begin(Busy::Loading)?;

        match self.service.list(&request).await {
            Ok(response) => {
                guard.settle(CrudAction::LoadSucceeded {
                    response,
                    paginated: self.config.paginated,
                })?;
                let items = self.items();
                info!("Loaded {} records", items.len());
                if let Some(hook) = &self.callbacks.on_success.load {
                    hook(&items);
                }
                Ok(())
            }
            Err(err) => {
                let error = CrudError::from_service(Operation::Load, &err);
                warn!("Load failed: {}", error.message);
                guard.settle(CrudAction::Failed {
                    busy: Busy::Loading,
                    message: error.message.clone(),
                })?;
                self.report(&error);
                Ok(())
            }
        }
    }

    /// Creates a record and puts it at the front of the collection.
    ///
    /// Returns `Ok(None)` without a create operation.
    pub async fn create(&self, data: Value) -> SyncResult<Option<T>> {
        if !self.supports(Operation::Create) {
            warn!("create requested but the service has no create operation; ignoring");
            return Ok(None);
        }

        let guard = self.begin(Busy::Creating)?;
        match self.service.create(data).await {
            Ok(entity) => {
                guard.settle(CrudAction::Created(entity.clone()))?;
                debug!("Created record");
                if let Some(hook) = &self.callbacks.on_success.create {
                    hook(&entity);
                }
                Ok(Some(entity))
            }
            Err(err) => Err(self.fail(guard, Operation::Create, &err)),
        }
    }

    /// Updates a record and replaces it (and the selection) in place.
    ///
    /// Returns `Ok(None)` without an update operation.
    pub async fn update(&self, key: &EntityKey, data: Value) -> SyncResult<Option<T>> {
        if !self.supports(Operation::Update) {
            warn!("update requested but the service has no update operation; ignoring");
            return Ok(None);
        }

        let guard = self.begin(Busy::Updating)?;
        match self.service.update(key, data).await {
            Ok(entity) => {
                guard.settle(CrudAction::Updated(entity.clone()))?;
                debug!("Updated record {}", key);
                if let Some(hook) = &self.callbacks.on_success.update {
                    hook(&entity);
                }
                Ok(Some(entity))
            }
            Err(err) => Err(self.fail(guard, Operation::Update, &err)),
        }
    }

    /// Deletes a record, clearing the selection if it pointed at it.
    ///
    /// Returns `Ok(false)` without a delete operation.
    pub async fn delete(&self, key: &EntityKey) -> SyncResult<bool> {
        if !self.supports(Operation::Delete) {
            warn!("delete requested but the service has no delete operation; ignoring");
            return Ok(false);
        }

        let guard = self.begin(Busy::Deleting)?;
        match self.service.delete(key).await {
            Ok(()) => {
                guard.settle(CrudAction::Deleted(key.clone()))?;
                debug!("Deleted record {}", key);
                if let Some(hook) = &self.callbacks.on_success.delete {
                    hook(key);
                }
                Ok(true)
            }
            Err(err) => Err(self.fail(guard, Operation::Delete, &err)),
        }
    }

    /// Fetches one record and merges it into the collection.
    ///
    /// Returns `Ok(None)` without a get operation.
    pub async fn fetch_one(&self, key: &EntityKey) -> SyncResult<Option<T>> {
        if !self.supports(Operation::Get) {
            warn!("fetch requested but the service has no get operation; ignoring");
            return Ok(None);
        }

        match self.service.get(key).await {
            Ok(entity) => {
                self.dispatch(CrudAction::Fetched(entity.clone()))?;
                Ok(Some(entity))
            }
            Err(err) => {
                let error = CrudError::from_service(Operation::Get, &err);
                warn!("Fetching {} failed: {}", key, error.message);
                self.dispatch(CrudAction::SetError(error.message.clone()))?;
                Err(error.into())
            }
        }
    }

    /// Moves the page cursor and reloads.
    pub async fn set_page(&self, page: u32) -> SyncResult<()> {
        self.dispatch(CrudAction::SetPage(page))?;
        self.load(None).await
    }

    // ── Local edits ──────────────────────────────────────────────

    pub fn select(&self, item: Option<T>) -> SyncResult<()> {
        self.dispatch(CrudAction::Select(item))
    }

    /// Restores the initial state.
    pub fn reset(&self) {
        let _ = self.dispatch(CrudAction::Reset);
    }

    pub fn set_items(&self, items: Vec<T>) -> SyncResult<()> {
        self.dispatch(CrudAction::SetItems(items))
    }

    /// Inserts a record at the front.
    pub fn add_item(&self, item: T) -> SyncResult<()> {
        self.dispatch(CrudAction::AddItem(item))
    }

    pub fn remove_item(&self, key: &EntityKey) -> SyncResult<()> {
        self.dispatch(CrudAction::RemoveItem(key.clone()))
    }

    pub fn update_item(&self, item: T) -> SyncResult<()> {
        self.dispatch(CrudAction::UpdateItem(item))
    }

    pub fn clear_error(&self) {
        let _ = self.dispatch(CrudAction::ClearError);
    }

    // ── Internals ────────────────────────────────────────────────

    fn dispatch(&self, action: CrudAction<T>) -> SyncResult<()> {
        let mut state = self.state.write();
        let next = reduce(&state, action, &self.config.id_field)?;
        *state = next;
        Ok(())
    }

    /// Cursor, then configured defaults, then call-site parameters.
    fn request_params(&self, params: Option<&QueryParams>) -> QueryParams {
        let cursor = self
            .state
            .read()
            .pagination()
            .map(Pagination::to_params)
            .unwrap_or_default();
        let merged = cursor.merged(&self.config.default_params);
        match params {
            Some(overrides) => merged.merged(overrides),
            None => merged,
        }
    }

    fn begin(&self, busy: Busy) -> SyncResult<BusyGuard<'_, T>> {
        let epoch = {
            let mut state = self.state.write();
            let next = reduce(&state, CrudAction::Begin(busy), &self.config.id_field)?;
            *state = next;
            state.epoch()
        };
        Ok(BusyGuard {
            container: self,
            busy,
            epoch,
            armed: true,
        })
    }

    fn fail(&self, guard: BusyGuard<'_, T>, operation: Operation, err: &ServiceError) -> SyncError {
        let error = CrudError::from_service(operation, err);
        warn!("{} failed: {}", operation, error.message);
        let busy = guard.busy;
        if let Err(e) = guard.settle(CrudAction::Failed {
            busy,
            message: error.message.clone(),
        }) {
            return e;
        }
        self.report(&error);
        SyncError::Operation(error)
    }

    fn report(&self, error: &CrudError) {
        if let Some(hook) = self.callbacks.on_error.get(error.operation) {
            hook(error);
        }
    }
}

/// Keeps a busy class raised while an action is in flight.
///
/// Dropping the action's future before it settles drops the guard, which
/// lowers the flag again.
struct BusyGuard<'a, T: Record> {
    container: &'a EntityContainer<T>,
    busy: Busy,
    /// State epoch when the action began.
    epoch: u64,
    armed: bool,
}

impl<T: Record> BusyGuard<'_, T> {
    /// Applies the settling action. If the action is rejected (a record
    /// without identity), the operation is recorded as failed instead.
    ///
    /// After a reset the result is dropped and only the busy class is
    /// lowered.
    fn settle(mut self, action: CrudAction<T>) -> SyncResult<()> {
        self.armed = false;
        let id_field = &self.container.config.id_field;
        let mut state = self.container.state.write();

        if state.epoch() != self.epoch {
            debug!("{:?} settled after a reset; result dropped", self.busy);
            let next = reduce(&state, CrudAction::Cancel(self.busy), id_field)?;
            *state = next;
            return Ok(());
        }

        match reduce(&state, action, id_field) {
            Ok(next) => {
                *state = next;
                Ok(())
            }
            Err(err) => {
                warn!("{:?} result rejected: {}", self.busy, err);
                let failed = CrudAction::Failed {
                    busy: self.busy,
                    message: err.to_string(),
                };
                if let Ok(next) = reduce(&state, failed, id_field) {
                    *state = next;
                }
                Err(err)
            }
        }
    }
}

impl<T: Record> Drop for BusyGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            debug!("{:?} abandoned before settling", self.busy);
            let _ = self.container.dispatch(CrudAction::Cancel(self.busy));
        }
    }
}
