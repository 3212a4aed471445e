//! Service contract.
//!
//! The narrow CRUD interface a resource-specific client implements to plug
//! into an [`EntityContainer`](crate::EntityContainer). Every operation is
//! optional: a client advertises what it implements through
//! [`Capabilities`], and containers degrade missing operations to a logged
//! no-op instead of calling them.

use crate::error::{Operation, ServiceError, ServiceResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tally_model::{ListResponse, QueryParams, Record};
use tally_types::EntityKey;

/// Which operations a service implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub list: bool,
    pub get: bool,
    pub create: bool,
    pub update: bool,
    pub delete: bool,
}

impl Capabilities {
    /// Every operation.
    pub const ALL: Self = Self {
        list: true,
        get: true,
        create: true,
        update: true,
        delete: true,
    };

    /// No operation.
    pub const NONE: Self = Self {
        list: false,
        get: false,
        create: false,
        update: false,
        delete: false,
    };

    /// Returns whether `operation` is implemented.
    #[must_use]
    pub fn supports(&self, operation: Operation) -> bool {
        match operation {
            Operation::Load => self.list,
            Operation::Get => self.get,
            Operation::Create => self.create,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }

    /// Returns a copy with `operation` removed.
    #[must_use]
    pub fn without(mut self, operation: Operation) -> Self {
        match operation {
            Operation::Load => self.list = false,
            Operation::Get => self.get = false,
            Operation::Create => self.create = false,
            Operation::Update => self.update = false,
            Operation::Delete => self.delete = false,
        }
        self
    }
}

/// A remote CRUD endpoint for one resource type.
///
/// Default bodies answer [`ServiceError::Unsupported`]; implementations
/// override the operations they list in [`capabilities`](Self::capabilities).
#[async_trait]
pub trait EntityService<T: Record>: Send + Sync {
    /// Operations this service implements.
    fn capabilities(&self) -> Capabilities;

    /// Lists records.
    async fn list(&self, params: &QueryParams) -> ServiceResult<ListResponse<T>> {
        let _ = params;
        Err(ServiceError::Unsupported(Operation::Load))
    }

    /// Fetches one record.
    async fn get(&self, key: &EntityKey) -> ServiceResult<T> {
        let _ = key;
        Err(ServiceError::Unsupported(Operation::Get))
    }

    /// Creates a record from a request body.
    async fn create(&self, data: Value) -> ServiceResult<T> {
        let _ = data;
        Err(ServiceError::Unsupported(Operation::Create))
    }

    /// Applies a partial change to a record.
    async fn update(&self, key: &EntityKey, data: Value) -> ServiceResult<T> {
        let _ = (key, data);
        Err(ServiceError::Unsupported(Operation::Update))
    }

    /// Deletes a record.
    async fn delete(&self, key: &EntityKey) -> ServiceResult<()> {
        let _ = key;
        Err(ServiceError::Unsupported(Operation::Delete))
    }
}

/// A scriptable service for testing.
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// A queue of scripted replies for one operation.
    #[derive(Debug)]
    pub struct Script<R> {
        replies: Mutex<VecDeque<(Duration, R)>>,
    }

    impl<R> Default for Script<R> {
        fn default() -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
            }
        }
    }

    impl<R> Script<R> {
        /// Queues a reply delivered immediately.
        pub fn reply(&self, reply: R) -> &Self {
            self.reply_after(Duration::ZERO, reply)
        }

        /// Queues a reply delivered after `delay`.
        pub fn reply_after(&self, delay: Duration, reply: R) -> &Self {
            self.replies.lock().push_back((delay, reply));
            self
        }

        /// Number of replies still queued.
        pub fn pending(&self) -> usize {
            self.replies.lock().len()
        }

        async fn next(&self) -> Option<R> {
            let next = self.replies.lock().pop_front();
            match next {
                Some((delay, reply)) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Some(reply)
                }
                None => None,
            }
        }
    }

    /// One recorded call.
    #[derive(Debug, Clone, PartialEq)]
    pub struct MockCall {
        pub operation: Operation,
        pub key: Option<EntityKey>,
        pub payload: Option<Value>,
    }

    /// A mock service with per-operation reply scripts and a call log.
    ///
    /// Unscripted calls fall back to: empty list, 404 for `get`, echo of the
    /// request body for `create`, an error for `update`, success for
    /// `delete`.
    pub struct MockService<T> {
        capabilities: Capabilities,
        list: Script<ServiceResult<ListResponse<T>>>,
        get: Script<ServiceResult<T>>,
        create: Script<ServiceResult<T>>,
        update: Script<ServiceResult<T>>,
        delete: Script<ServiceResult<()>>,
        calls: Mutex<Vec<MockCall>>,
    }

    impl<T: Record> MockService<T> {
        /// Creates a mock implementing every operation.
        pub fn new() -> Self {
            Self::with_capabilities(Capabilities::ALL)
        }

        /// Creates a mock advertising only `capabilities`.
        pub fn with_capabilities(capabilities: Capabilities) -> Self {
            Self {
                capabilities,
                list: Script::default(),
                get: Script::default(),
                create: Script::default(),
                update: Script::default(),
                delete: Script::default(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn on_list(&self) -> &Script<ServiceResult<ListResponse<T>>> {
            &self.list
        }

        pub fn on_get(&self) -> &Script<ServiceResult<T>> {
            &self.get
        }

        pub fn on_create(&self) -> &Script<ServiceResult<T>> {
            &self.create
        }

        pub fn on_update(&self) -> &Script<ServiceResult<T>> {
            &self.update
        }

        pub fn on_delete(&self) -> &Script<ServiceResult<()>> {
            &self.delete
        }

        /// All calls received so far.
        pub fn calls(&self) -> Vec<MockCall> {
            self.calls.lock().clone()
        }

        /// Calls received for one operation.
        pub fn calls_to(&self, operation: Operation) -> Vec<MockCall> {
            self.calls
                .lock()
                .iter()
                .filter(|c| c.operation == operation)
                .cloned()
                .collect()
        }

        fn record(&self, operation: Operation, key: Option<&EntityKey>, payload: Option<Value>) {
            self.calls.lock().push(MockCall {
                operation,
                key: key.cloned(),
                payload,
            });
        }
    }

    impl<T: Record> Default for MockService<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl<T: Record> EntityService<T> for MockService<T> {
        fn capabilities(&self) -> Capabilities {
            self.capabilities
        }

        async fn list(&self, params: &QueryParams) -> ServiceResult<ListResponse<T>> {
            self.record(Operation::Load, None, Some(params.to_value()));
            self.list
                .next()
                .await
                .unwrap_or_else(|| Ok(ListResponse::Items(Vec::new())))
        }

        async fn get(&self, key: &EntityKey) -> ServiceResult<T> {
            self.record(Operation::Get, Some(key), None);
            match self.get.next().await {
                Some(reply) => reply,
                None => Err(ServiceError::response(
                    404,
                    serde_json::json!({ "detail": format!("{key} not found") }),
                )),
            }
        }

        async fn create(&self, data: Value) -> ServiceResult<T> {
            self.record(Operation::Create, None, Some(data.clone()));
            match self.create.next().await {
                Some(reply) => reply,
                None => serde_json::from_value(data).map_err(|e| ServiceError::Other(e.to_string())),
            }
        }

        async fn update(&self, key: &EntityKey, data: Value) -> ServiceResult<T> {
            self.record(Operation::Update, Some(key), Some(data));
            match self.update.next().await {
                Some(reply) => reply,
                None => Err(ServiceError::Other(format!("no scripted update for {key}"))),
            }
        }

        async fn delete(&self, key: &EntityKey) -> ServiceResult<()> {
            self.record(Operation::Delete, Some(key), None);
            self.delete.next().await.unwrap_or(Ok(()))
        }
    }
}
