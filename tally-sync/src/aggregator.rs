//! Multi-source query aggregator.
//!
//! Issues one query per active partition (profile), in parallel, through the
//! shared [`QueryClient`], and presents the results as one merged view:
//! items flattened in partition order, totals summed, loading ORed, first
//! error wins.

use crate::cache::{QueryClient, QueryKey};
use crate::error::{normalize_message, ServiceResult, SyncError, SyncResult};
use crate::service::EntityService;
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tally_model::{ListResponse, QueryParams, Record};
use tally_types::{Amount, PartitionId};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How one resource is queried per partition.
///
/// The aggregator itself knows nothing about the resource; everything
/// resource-specific goes through this trait.
#[async_trait]
pub trait PartitionQuery: Send + Sync + 'static {
    /// Raw response of one query.
    type Response: Send + Sync + 'static;
    /// Record type extracted from responses.
    type Item: Clone + Send + Sync + 'static;

    /// Request parameters for one partition.
    fn params_for(&self, partition: &PartitionId) -> QueryParams;

    /// Cache key for a request.
    fn query_key(&self, params: &QueryParams) -> QueryKey;

    async fn fetch(&self, params: &QueryParams) -> ServiceResult<Self::Response>;

    fn extract_items(&self, response: &Self::Response) -> Vec<Self::Item>;

    /// Total reported by the response. `None` counts the extracted items.
    fn extract_total(&self, response: &Self::Response) -> Option<u64> {
        let _ = response;
        None
    }
}

/// Lists an [`EntityService`] once per partition, passing the partition
/// under `partition_param`.
pub struct ServicePartitions<T: Record> {
    service: Arc<dyn EntityService<T>>,
    resource: String,
    partition_param: String,
    base_params: QueryParams,
}

impl<T: Record> ServicePartitions<T> {
    pub fn new(
        service: Arc<dyn EntityService<T>>,
        resource: impl Into<String>,
        partition_param: impl Into<String>,
    ) -> Self {
        Self {
            service,
            resource: resource.into(),
            partition_param: partition_param.into(),
            base_params: QueryParams::new(),
        }
    }

    /// Parameters sent with every partition's request.
    #[must_use]
    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.base_params = params;
        self
    }

    /// Key prefix covering every partition of this resource.
    pub fn resource_key(&self) -> QueryKey {
        QueryKey::root(self.resource.clone()).with("list")
    }
}

#[async_trait]
impl<T: Record> PartitionQuery for ServicePartitions<T> {
    type Response = ListResponse<T>;
    type Item = T;

    fn params_for(&self, partition: &PartitionId) -> QueryParams {
        self.base_params
            .clone()
            .with(self.partition_param.clone(), partition.as_str())
    }

    fn query_key(&self, params: &QueryParams) -> QueryKey {
        self.resource_key().with(params.to_value().to_string())
    }

    async fn fetch(&self, params: &QueryParams) -> ServiceResult<ListResponse<T>> {
        self.service.list(params).await
    }

    fn extract_items(&self, response: &ListResponse<T>) -> Vec<T> {
        response.items().to_vec()
    }

    fn extract_total(&self, response: &ListResponse<T>) -> Option<u64> {
        response.total()
    }
}

/// Merged view over every partition.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    /// The partition list is unresolved or some query is running.
    pub is_loading: bool,
    /// First failing partition's message, in partition order.
    pub error: Option<String>,
    /// Every partition whose last query failed.
    pub failed_partitions: Vec<PartitionId>,
}

struct Slot<R> {
    partition: PartitionId,
    key: QueryKey,
    params: QueryParams,
    in_flight: usize,
    response: Option<Arc<R>>,
    error: Option<String>,
}

struct Partitions<R> {
    resolved: bool,
    slots: Vec<Slot<R>>,
}

/// Runs one query per partition and merges the results.
pub struct QueryAggregator<Q: PartitionQuery> {
    query: Q,
    cache: QueryClient,
    state: RwLock<Partitions<Q::Response>>,
}

impl<Q: PartitionQuery> QueryAggregator<Q> {
    /// Creates an aggregator whose partition list is still unresolved.
    pub fn new(query: Q, cache: QueryClient) -> Self {
        Self {
            query,
            cache,
            state: RwLock::new(Partitions {
                resolved: false,
                slots: Vec::new(),
            }),
        }
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    /// Replaces the active partitions. `None` means the list itself is
    /// still resolving.
    ///
    /// Partitions that stay active keep their last result; new ones start
    /// from whatever the cache holds. Repeated ids are dropped.
    pub fn set_partitions(&self, partitions: Option<Vec<PartitionId>>) {
        let mut state = self.state.write();
        let Some(ids) = partitions else {
            state.resolved = false;
            state.slots.clear();
            return;
        };

        let mut previous = std::mem::take(&mut state.slots);
        let mut slots: Vec<Slot<Q::Response>> = Vec::with_capacity(ids.len());
        for partition in ids {
            if slots.iter().any(|s| s.partition == partition) {
                continue;
            }
            let params = self.query.params_for(&partition);
            let key = self.query.query_key(&params);
            let reused = previous
                .iter()
                .position(|s| s.key == key && s.partition == partition);
            let slot = match reused {
                Some(i) => previous.swap_remove(i),
                None => Slot {
                    response: self.cache.get(&key),
                    partition,
                    key,
                    params,
                    in_flight: 0,
                    error: None,
                },
            };
            slots.push(slot);
        }
        debug!("Aggregating {} partitions", slots.len());
        state.slots = slots;
        state.resolved = true;
    }

    /// Active partitions, `None` while unresolved.
    pub fn partitions(&self) -> Option<Vec<PartitionId>> {
        let state = self.state.read();
        state
            .resolved
            .then(|| state.slots.iter().map(|s| s.partition.clone()).collect())
    }

    /// Cache keys of the active partitions.
    pub fn keys(&self) -> Vec<QueryKey> {
        self.state.read().slots.iter().map(|s| s.key.clone()).collect()
    }

    /// Queries every partition whose cached result is not fresh.
    pub async fn load(&self) -> AggregatedResult<Q::Item> {
        self.run(false).await
    }

    /// Re-runs every partition's query.
    ///
    /// Queries run concurrently and settle in any order; each partition's
    /// slot is updated as soon as its own query settles.
    pub async fn refetch(&self) -> AggregatedResult<Q::Item> {
        self.run(true).await
    }

    async fn run(&self, force: bool) -> AggregatedResult<Q::Item> {
        let targets: Vec<(QueryKey, QueryParams)> = {
            let mut state = self.state.write();
            let mut targets = Vec::new();
            for slot in state.slots.iter_mut() {
                if !force {
                    if let Some(hit) = self.cache.get_fresh(&slot.key) {
                        slot.response = Some(hit);
                        slot.error = None;
                        continue;
                    }
                }
                slot.in_flight += 1;
                // Partitions sharing a key share one query.
                if !targets.iter().any(|(key, _)| *key == slot.key) {
                    targets.push((slot.key.clone(), slot.params.clone()));
                }
            }
            targets
        };

        if !targets.is_empty() {
            let count = targets.len();
            join_all(
                targets
                    .into_iter()
                    .map(|(key, params)| self.settle_one(key, params)),
            )
            .await;
            info!("Refetched {} partition queries", count);
        }
        self.snapshot()
    }

    async fn settle_one(&self, key: QueryKey, params: QueryParams) {
        let _flight = SlotFlight {
            state: &self.state,
            key: key.clone(),
        };
        let result = self.cache.fetch(&key, || self.query.fetch(&params)).await;

        let mut state = self.state.write();
        let mut matched = false;
        for slot in state.slots.iter_mut().filter(|s| s.key == key) {
            matched = true;
            match &result {
                Ok(response) => {
                    debug!("Partition {} settled", slot.partition);
                    slot.response = Some(response.clone());
                    slot.error = None;
                }
                Err(err) => {
                    let message = normalize_message(err);
                    warn!("Partition {} failed: {}", slot.partition, message);
                    slot.error = Some(message);
                }
            }
        }
        if !matched {
            debug!("Partition for {} left before its query settled", key);
        }
    }

    /// The merged view as of now.
    pub fn snapshot(&self) -> AggregatedResult<Q::Item> {
        let state = self.state.read();
        let mut result = AggregatedResult {
            items: Vec::new(),
            total: 0,
            is_loading: !state.resolved,
            error: None,
            failed_partitions: Vec::new(),
        };

        for slot in &state.slots {
            result.is_loading |= slot.in_flight > 0;
            if let Some(response) = &slot.response {
                let items = self.query.extract_items(response);
                result.total += self
                    .query
                    .extract_total(response)
                    .unwrap_or(items.len() as u64);
                result.items.extend(items);
            }
            if let Some(message) = &slot.error {
                if result.error.is_none() {
                    result.error = Some(message.clone());
                }
                result.failed_partitions.push(slot.partition.clone());
            }
        }
        result
    }

    /// Latest response of each partition that has one, in partition order.
    pub fn responses(&self) -> Vec<Arc<Q::Response>> {
        self.state
            .read()
            .slots
            .iter()
            .filter_map(|s| s.response.clone())
            .collect()
    }

    /// Refetches whenever one of this aggregator's keys is invalidated.
    ///
    /// The task holds only a weak reference and ends once the aggregator
    /// is dropped or the cache goes away.
    pub fn watch_invalidations(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.cache.subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let refresh = match events.recv().await {
                    Ok(prefix) => match weak.upgrade() {
                        Some(this) => this.keys().iter().any(|k| k.starts_with(&prefix)),
                        None => break,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Missed {} invalidations, refetching", skipped);
                        true
                    }
                    Err(RecvError::Closed) => break,
                };
                if refresh {
                    let Some(this) = weak.upgrade() else { break };
                    this.refetch().await;
                }
            }
        })
    }
}

impl<Q: PartitionQuery> QueryAggregator<Q>
where
    Q::Response: Serialize,
{
    /// Sums `fields` across every partition's response.
    pub fn sum_fields(&self, fields: &[&str], mode: SumMode) -> SyncResult<BTreeMap<String, String>> {
        let records = self.response_values()?;
        sum_fields(&records, fields, mode)
    }

    /// Exact per-field totals across every partition's response.
    pub fn sum_amounts(&self, fields: &[&str]) -> SyncResult<BTreeMap<String, Amount>> {
        let records = self.response_values()?;
        sum_amounts(&records, fields)
    }

    fn response_values(&self) -> SyncResult<Vec<Value>> {
        self.responses()
            .iter()
            .map(|r| serde_json::to_value(r.as_ref()).map_err(SyncError::from))
            .collect()
    }
}

/// Lowers the in-flight count of every slot on a key when its query
/// settles or is dropped.
struct SlotFlight<'a, R> {
    state: &'a RwLock<Partitions<R>>,
    key: QueryKey,
}

impl<R> Drop for SlotFlight<'_, R> {
    fn drop(&mut self) {
        let mut state = self.state.write();
        for slot in state.slots.iter_mut().filter(|s| s.key == self.key) {
            slot.in_flight = slot.in_flight.saturating_sub(1);
        }
    }
}

// ── Field sums ───────────────────────────────────────────────────

/// Arithmetic used to sum decimal-string fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SumMode {
    /// Fixed-point [`Amount`] arithmetic.
    #[default]
    Exact,
    /// `f64` arithmetic. Drifts; for display only.
    Float,
}

/// Sums each field across `records` with fixed-point arithmetic.
///
/// Missing and `null` fields count as zero; anything that is not a decimal
/// string or number is an error.
pub fn sum_amounts(records: &[Value], fields: &[&str]) -> SyncResult<BTreeMap<String, Amount>> {
    let mut totals = BTreeMap::new();
    for field in fields {
        let mut total = Amount::ZERO;
        for record in records {
            let value = record.get(*field).unwrap_or(&Value::Null);
            let amount = Amount::from_json(value)?;
            total = total
                .checked_add(amount)
                .ok_or(tally_types::Error::AmountOverflow)?;
        }
        totals.insert((*field).to_string(), total);
    }
    Ok(totals)
}

/// Sums each field across `records` as `f64`. Unparseable values count as
/// zero.
pub fn sum_floats(records: &[Value], fields: &[&str]) -> BTreeMap<String, f64> {
    fields
        .iter()
        .map(|field| {
            let total = records
                .iter()
                .map(|record| match record.get(*field) {
                    Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
                    Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
                    _ => 0.0,
                })
                .sum();
            ((*field).to_string(), total)
        })
        .collect()
}

/// Sums each field and renders the totals as decimal strings.
pub fn sum_fields(
    records: &[Value],
    fields: &[&str],
    mode: SumMode,
) -> SyncResult<BTreeMap<String, String>> {
    Ok(match mode {
        SumMode::Exact => sum_amounts(records, fields)?
            .into_iter()
            .map(|(field, total)| (field, total.to_string()))
            .collect(),
        SumMode::Float => sum_floats(records, fields)
            .into_iter()
            .map(|(field, total)| (field, total.to_string()))
            .collect(),
    })
}
