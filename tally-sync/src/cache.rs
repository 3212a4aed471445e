//! Query cache shared by aggregators and mutations.
//!
//! Entries are keyed by [`QueryKey`] and stored type-erased, so one client
//! can hold responses of every resource. Invalidation marks entries stale
//! and broadcasts the invalidated prefix; listeners (aggregators) decide
//! whether to refetch. Broadcasting never waits on listeners.

use crate::error::{ServiceError, ServiceResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

/// Hierarchical cache key, e.g. `["transactions", "list", "profile=7"]`.
///
/// Invalidating a key invalidates every key it is a prefix of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// A single-segment key.
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Returns the key extended by one segment.
    #[must_use]
    pub fn with(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether `prefix` covers this key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Configuration for the query cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a response counts as fresh (ms).
    pub stale_time_ms: u64,
    /// Extra attempts after a failed fetch.
    pub retry: u32,
    /// Pause between attempts (ms).
    pub retry_delay_ms: u64,
    /// Buffered invalidation events per subscriber.
    pub channel_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: 30_000,
            retry: 3,
            retry_delay_ms: 1_000,
            channel_capacity: 64,
        }
    }
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    fetched_at: Instant,
    invalidated: bool,
}

struct Inner {
    config: CacheConfig,
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
    invalidations: broadcast::Sender<QueryKey>,
}

/// Handle to a shared query cache. Clones share the same entries.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<Inner>,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl QueryClient {
    pub fn new(config: CacheConfig) -> Self {
        let (invalidations, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                config,
                entries: Mutex::new(HashMap::new()),
                invalidations,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Runs `fetcher` and stores its response under `key`.
    ///
    /// Failed attempts are retried `retry` times, except for operations the
    /// service does not support.
    pub async fn fetch<R, F, Fut>(&self, key: &QueryKey, fetcher: F) -> ServiceResult<Arc<R>>
    where
        R: Send + Sync + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = ServiceResult<R>>,
    {
        let retries = self.inner.config.retry;
        let mut attempt = 0;
        loop {
            match fetcher().await {
                Ok(response) => {
                    let value = Arc::new(response);
                    self.store(key, value.clone());
                    return Ok(value);
                }
                Err(err @ ServiceError::Unsupported(_)) => return Err(err),
                Err(err) if attempt >= retries => return Err(err),
                Err(err) => {
                    attempt += 1;
                    debug!("Query {} failed ({}), retry {}/{}", key, err, attempt, retries);
                    tokio::time::sleep(Duration::from_millis(self.inner.config.retry_delay_ms))
                        .await;
                }
            }
        }
    }

    /// Serves a fresh cached response, or fetches.
    pub async fn fetch_cached<R, F, Fut>(&self, key: &QueryKey, fetcher: F) -> ServiceResult<Arc<R>>
    where
        R: Send + Sync + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = ServiceResult<R>>,
    {
        match self.get_fresh(key) {
            Some(hit) => Ok(hit),
            None => self.fetch(key, fetcher).await,
        }
    }

    /// The cached response under `key`, fresh or not.
    pub fn get<R: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<R>> {
        let value = self.inner.entries.lock().get(key)?.value.clone();
        value.downcast::<R>().ok()
    }

    /// The cached response under `key` if it is neither invalidated nor
    /// older than the stale time.
    pub fn get_fresh<R: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<R>> {
        let value = {
            let entries = self.inner.entries.lock();
            let entry = entries.get(key)?;
            if self.entry_is_stale(entry) {
                return None;
            }
            entry.value.clone()
        };
        value.downcast::<R>().ok()
    }

    /// Stores a response directly.
    pub fn set<R: Send + Sync + 'static>(&self, key: &QueryKey, value: R) {
        self.store(key, Arc::new(value));
    }

    /// Whether `key` is missing, invalidated or past its stale time.
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.inner
            .entries
            .lock()
            .get(key)
            .is_none_or(|entry| self.entry_is_stale(entry))
    }

    /// Marks every entry under `prefix` stale and notifies subscribers.
    ///
    /// Returns the number of entries marked. Subscribers are notified even
    /// when nothing was cached yet.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let marked = {
            let mut entries = self.inner.entries.lock();
            let mut marked = 0;
            for (key, entry) in entries.iter_mut() {
                if key.starts_with(prefix) {
                    entry.invalidated = true;
                    marked += 1;
                }
            }
            marked
        };
        debug!("Invalidated {} entries under {}", marked, prefix);
        // No subscribers is not an error.
        let _ = self.inner.invalidations.send(prefix.clone());
        marked
    }

    /// Receives every invalidated prefix from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<QueryKey> {
        self.inner.invalidations.subscribe()
    }

    /// Removes every entry under `prefix`.
    pub fn remove(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.inner.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.inner.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    fn store(&self, key: &QueryKey, value: Arc<dyn Any + Send + Sync>) {
        self.inner.entries.lock().insert(
            key.clone(),
            CacheEntry {
                value,
                fetched_at: Instant::now(),
                invalidated: false,
            },
        );
    }

    fn entry_is_stale(&self, entry: &CacheEntry) -> bool {
        entry.invalidated
            || entry.fetched_at.elapsed() >= Duration::from_millis(self.inner.config.stale_time_ms)
    }
}
