//! Container state and its reducer.
//!
//! Every change to a [`CrudState`] goes through [`reduce`], a pure function
//! from `(state, action)` to the next state. Containers only decide *which*
//! action to dispatch; the reducer decides what it means, which keeps the
//! transition rules testable without a service or a runtime.

use crate::error::SyncResult;
use tally_model::{IdField, ListResponse, Pagination, Record};
use tally_types::EntityKey;

/// The four independent busy classes of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Busy {
    Loading,
    Creating,
    Updating,
    Deleting,
}

/// Number of running operations per busy class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct InFlight {
    loading: usize,
    creating: usize,
    updating: usize,
    deleting: usize,
}

impl InFlight {
    fn slot(&mut self, busy: Busy) -> &mut usize {
        match busy {
            Busy::Loading => &mut self.loading,
            Busy::Creating => &mut self.creating,
            Busy::Updating => &mut self.updating,
            Busy::Deleting => &mut self.deleting,
        }
    }
}

/// Records held by one container, plus busy flags, error slot, selection
/// and page cursor.
///
/// `items` and its identity keys are kept in lockstep; every record is
/// validated for a scalar identity on its way in.
#[derive(Debug, Clone, PartialEq)]
pub struct CrudState<T> {
    items: Vec<T>,
    keys: Vec<EntityKey>,
    in_flight: InFlight,
    error: Option<String>,
    selected: Option<(EntityKey, T)>,
    pagination: Option<Pagination>,
    epoch: u64,
}

impl<T> Default for CrudState<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T> CrudState<T> {
    /// An empty state, optionally with a page cursor.
    #[must_use]
    pub fn new(pagination: Option<Pagination>) -> Self {
        Self {
            items: Vec::new(),
            keys: Vec::new(),
            in_flight: InFlight::default(),
            error: None,
            selected: None,
            pagination,
            epoch: 0,
        }
    }

    /// Records in insertion/fetch order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Identity keys, parallel to [`items`](Self::items).
    pub fn keys(&self) -> &[EntityKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Position of the record with `key`.
    pub fn position(&self, key: &EntityKey) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    /// The record with `key`.
    pub fn find(&self, key: &EntityKey) -> Option<&T> {
        self.position(key).map(|i| &self.items[i])
    }

    pub fn loading(&self) -> bool {
        self.in_flight.loading > 0
    }

    pub fn creating(&self) -> bool {
        self.in_flight.creating > 0
    }

    pub fn updating(&self) -> bool {
        self.in_flight.updating > 0
    }

    pub fn deleting(&self) -> bool {
        self.in_flight.deleting > 0
    }

    /// Whether any operation class is running.
    pub fn is_busy(&self) -> bool {
        self.in_flight != InFlight::default()
    }

    /// Last error message.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn selected_item(&self) -> Option<&T> {
        self.selected.as_ref().map(|(_, item)| item)
    }

    pub fn selected_key(&self) -> Option<&EntityKey> {
        self.selected.as_ref().map(|(key, _)| key)
    }

    pub fn pagination(&self) -> Option<&Pagination> {
        self.pagination.as_ref()
    }

    /// Number of resets so far. Operations begun under an older epoch
    /// must not apply their results.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// A state transition.
#[derive(Debug, Clone)]
pub enum CrudAction<T> {
    /// An operation of this class started. Starting a load clears the error.
    Begin(Busy),
    /// An operation was abandoned before settling.
    Cancel(Busy),
    /// A load settled successfully.
    LoadSucceeded {
        response: ListResponse<T>,
        paginated: bool,
    },
    /// A create settled; the record goes to the front.
    Created(T),
    /// An update settled; the record replaces its namesake.
    Updated(T),
    /// A delete settled.
    Deleted(EntityKey),
    /// An operation of this class failed.
    Failed { busy: Busy, message: String },
    /// A single record was fetched; replaced in place or prepended.
    Fetched(T),
    /// Sets the error slot without touching busy flags.
    SetError(String),
    ClearError,
    Select(Option<T>),
    SetItems(Vec<T>),
    /// Local insert at the front.
    AddItem(T),
    /// Local removal; the selection is left alone.
    RemoveItem(EntityKey),
    /// Local replacement, selection included.
    UpdateItem(T),
    /// Moves the page cursor. Ignored without pagination.
    SetPage(u32),
    /// Back to an empty state with the cursor on page 1. Running operations
    /// stay counted and the epoch advances.
    Reset,
}

/// Computes the state that follows `action`.
///
/// Fails only when a record entering the state has no scalar identity; the
/// input state is never modified, so a failed transition leaves the caller
/// holding the previous state.
pub fn reduce<T: Record>(
    state: &CrudState<T>,
    action: CrudAction<T>,
    id_field: &IdField,
) -> SyncResult<CrudState<T>> {
    let mut next = state.clone();
    next.apply(action, id_field)?;
    Ok(next)
}

impl<T: Record> CrudState<T> {
    fn apply(&mut self, action: CrudAction<T>, id_field: &IdField) -> SyncResult<()> {
        match action {
            CrudAction::Begin(busy) => {
                *self.in_flight.slot(busy) += 1;
                if busy == Busy::Loading {
                    self.error = None;
                }
            }
            CrudAction::Cancel(busy) => self.end(busy),
            CrudAction::LoadSucceeded {
                response,
                paginated,
            } => {
                let items = match response {
                    ListResponse::Page { data, total } if paginated => {
                        self.pagination = self.pagination.map(|p| p.with_total(total));
                        data
                    }
                    ListResponse::Items(items) => items,
                    _ => Vec::new(),
                };
                self.replace_all(items, id_field)?;
                self.end(Busy::Loading);
            }
            CrudAction::Created(item) => {
                let key = id_field.key_of(&item)?;
                self.items.insert(0, item);
                self.keys.insert(0, key);
                self.end(Busy::Creating);
            }
            CrudAction::Updated(item) => {
                self.replace(item, id_field)?;
                self.end(Busy::Updating);
            }
            CrudAction::Deleted(key) => {
                self.remove(&key);
                if self.selected_key() == Some(&key) {
                    self.selected = None;
                }
                self.end(Busy::Deleting);
            }
            CrudAction::Failed { busy, message } => {
                self.error = Some(message);
                self.end(busy);
            }
            CrudAction::Fetched(item) => {
                let key = id_field.key_of(&item)?;
                if self.position(&key).is_some() {
                    self.replace(item, id_field)?;
                } else {
                    self.items.insert(0, item);
                    self.keys.insert(0, key);
                }
            }
            CrudAction::SetError(message) => self.error = Some(message),
            CrudAction::ClearError => self.error = None,
            CrudAction::Select(item) => {
                self.selected = match item {
                    Some(item) => Some((id_field.key_of(&item)?, item)),
                    None => None,
                };
            }
            CrudAction::SetItems(items) => self.replace_all(items, id_field)?,
            CrudAction::AddItem(item) => {
                let key = id_field.key_of(&item)?;
                self.items.insert(0, item);
                self.keys.insert(0, key);
            }
            CrudAction::RemoveItem(key) => self.remove(&key),
            CrudAction::UpdateItem(item) => self.replace(item, id_field)?,
            CrudAction::SetPage(page) => {
                if let Some(p) = self.pagination.as_mut() {
                    p.page = page;
                }
            }
            CrudAction::Reset => {
                let in_flight = self.in_flight;
                let epoch = self.epoch.wrapping_add(1);
                *self = Self::new(self.pagination.map(|p| Pagination::new(1, p.page_size)));
                self.in_flight = in_flight;
                self.epoch = epoch;
            }
        }
        Ok(())
    }

    fn end(&mut self, busy: Busy) {
        let slot = self.in_flight.slot(busy);
        *slot = slot.saturating_sub(1);
    }

    fn replace_all(&mut self, items: Vec<T>, id_field: &IdField) -> SyncResult<()> {
        let keys = items
            .iter()
            .map(|item| id_field.key_of(item))
            .collect::<Result<Vec<_>, _>>()?;
        self.items = items;
        self.keys = keys;
        Ok(())
    }

    /// Replaces every record sharing `item`'s identity, and the selection
    /// if it matches. Absent records are not inserted.
    fn replace(&mut self, item: T, id_field: &IdField) -> SyncResult<()> {
        let key = id_field.key_of(&item)?;
        for (slot, k) in self.items.iter_mut().zip(&self.keys) {
            if *k == key {
                *slot = item.clone();
            }
        }
        if let Some((selected_key, selected)) = self.selected.as_mut() {
            if *selected_key == key {
                *selected = item;
            }
        }
        Ok(())
    }

    fn remove(&mut self, key: &EntityKey) {
        let mut i = 0;
        while i < self.keys.len() {
            if &self.keys[i] == key {
                self.keys.remove(i);
                self.items.remove(i);
            } else {
                i += 1;
            }
        }
    }
}
