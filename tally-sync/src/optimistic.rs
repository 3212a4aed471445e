//! Optimistic update coordinator.
//!
//! Applies an update or delete to a container's local state before the
//! service answers, and puts the previous record back if the service call
//! fails. Failures are always returned after the rollback.
//!
//! Two overlapping optimistic mutations of the same key would otherwise
//! race: the rollback of the first can overwrite the speculative state of
//! the second. By default mutations are serialized per key to rule that
//! out; see [`OptimisticConfig::serialize_per_key`].

use crate::container::EntityContainer;
use crate::error::{Operation, SyncResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tally_model::{merge_patch, Record};
use tally_types::EntityKey;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

/// Configuration for the optimistic coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimisticConfig {
    /// Run optimistic mutations of the same key one after another.
    pub serialize_per_key: bool,
}

impl Default for OptimisticConfig {
    fn default() -> Self {
        Self {
            serialize_per_key: true,
        }
    }
}

/// Wraps a container's `update` and `delete` with speculative apply and
/// rollback.
pub struct OptimisticCoordinator<T: Record> {
    container: Arc<EntityContainer<T>>,
    config: OptimisticConfig,
    locks: Arc<KeyLocks>,
}

impl<T: Record> OptimisticCoordinator<T> {
    pub fn new(container: Arc<EntityContainer<T>>) -> Self {
        Self::with_config(container, OptimisticConfig::default())
    }

    pub fn with_config(container: Arc<EntityContainer<T>>, config: OptimisticConfig) -> Self {
        Self {
            container,
            config,
            locks: Arc::new(KeyLocks::default()),
        }
    }

    /// The wrapped container.
    pub fn container(&self) -> &Arc<EntityContainer<T>> {
        &self.container
    }

    /// Number of keys with a mutation running or queued.
    pub fn keys_in_flight(&self) -> usize {
        self.locks.len()
    }

    /// Updates a record, showing the merged change immediately.
    ///
    /// On failure the record captured before the call is restored verbatim
    /// and the error is returned.
    pub async fn update(&self, key: &EntityKey, patch: Value) -> SyncResult<Option<T>> {
        if !self.container.supports(Operation::Update) {
            return self.container.update(key, patch).await;
        }

        let _lease = self.lease(key).await;
        let snapshot = self.container.find(key);
        if let Some(previous) = &snapshot {
            let speculative = merge_patch(previous, &patch)?;
            self.container.update_item(speculative)?;
            debug!("Applied optimistic update to {}", key);
        }

        match self.container.update(key, patch).await {
            Ok(confirmed) => Ok(confirmed),
            Err(err) => {
                if let Some(previous) = snapshot {
                    if let Err(e) = self.container.update_item(previous) {
                        warn!("Could not restore {} after failed update: {}", key, e);
                    } else {
                        warn!("Update of {} failed, previous record restored", key);
                    }
                }
                Err(err)
            }
        }
    }

    /// Deletes a record, removing it immediately.
    ///
    /// On failure the captured record is put back at the front of the
    /// collection (its original position is not kept) and the error is
    /// returned.
    pub async fn delete(&self, key: &EntityKey) -> SyncResult<bool> {
        if !self.container.supports(Operation::Delete) {
            return self.container.delete(key).await;
        }

        let _lease = self.lease(key).await;
        let snapshot = self.container.find(key);
        if snapshot.is_some() {
            self.container.remove_item(key)?;
            debug!("Optimistically removed {}", key);
        }

        match self.container.delete(key).await {
            Ok(deleted) => Ok(deleted),
            Err(err) => {
                if let Some(previous) = snapshot {
                    if let Err(e) = self.container.add_item(previous) {
                        warn!("Could not restore {} after failed delete: {}", key, e);
                    } else {
                        warn!("Delete of {} failed, record restored", key);
                    }
                }
                Err(err)
            }
        }
    }

    async fn lease(&self, key: &EntityKey) -> Option<KeyLease> {
        if self.config.serialize_per_key {
            Some(KeyLocks::acquire(&self.locks, key).await)
        } else {
            None
        }
    }
}

/// One async mutex per key with a mutation running or queued.
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<EntityKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    async fn acquire(this: &Arc<Self>, key: &EntityKey) -> KeyLease {
        let lock = this.locks.lock().entry(key.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        KeyLease {
            locks: Arc::clone(this),
            key: key.clone(),
            guard: Some(guard),
        }
    }

    fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drops the entry for `key` once nobody holds or waits on it.
    fn prune(&self, key: &EntityKey) {
        let mut locks = self.locks.lock();
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }
}

struct KeyLease {
    locks: Arc<KeyLocks>,
    key: EntityKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.prune(&self.key);
    }
}
