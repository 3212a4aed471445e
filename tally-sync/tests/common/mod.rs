//! Shared fixtures for sync-layer tests.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tally_sync::{ContainerConfig, EntityContainer, MockService, ServiceError};
use tracing_subscriber::EnvFilter;

/// A transaction as the service returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Txn {
    pub id: i64,
    pub memo: String,
    pub amount: String,
}

pub fn txn(id: i64, memo: &str) -> Txn {
    Txn {
        id,
        memo: memo.to_string(),
        amount: "0.00".to_string(),
    }
}

pub fn txn_json(id: i64, memo: &str) -> Value {
    json!({ "id": id, "memo": memo, "amount": "0.00" })
}

/// A 4xx/5xx response carrying a `detail` message.
pub fn rejected(status: u16, detail: &str) -> ServiceError {
    ServiceError::response(status, json!({ "detail": detail }))
}

pub fn mock() -> Arc<MockService<Txn>> {
    Arc::new(MockService::new())
}

pub fn container(service: &Arc<MockService<Txn>>) -> EntityContainer<Txn> {
    container_with(service, ContainerConfig::default())
}

pub fn container_with(service: &Arc<MockService<Txn>>, config: ContainerConfig) -> EntityContainer<Txn> {
    EntityContainer::<Txn>::new(service.clone(), config)
}

/// Routes `tracing` output to the test harness; `RUST_LOG` filters it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
