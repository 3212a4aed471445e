mod common;

use common::{container, mock, rejected, txn, Txn};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tally_types::EntityKey;
use tally_sync::{
    Capabilities, MockService, Operation, OptimisticConfig, OptimisticCoordinator,
};
use tokio::time::sleep;

fn coordinator(service: &Arc<MockService<Txn>>, items: Vec<Txn>) -> OptimisticCoordinator<Txn> {
    let c = container(service);
    c.set_items(items).unwrap();
    OptimisticCoordinator::new(Arc::new(c))
}

// ── Update ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn update_is_visible_before_the_service_answers() {
    let service = mock();
    service.on_update().reply_after(
        Duration::from_millis(100),
        Ok(Txn {
            id: 1,
            memo: "groceries".into(),
            amount: "42.10".into(),
        }),
    );
    let opt = coordinator(&service, vec![txn(1, "grocery"), txn(2, "rent")]);

    let key: EntityKey = 1.into();
    let (result, ()) = tokio::join!(
        opt.update(&key, json!({ "memo": "groceries" })),
        async {
            sleep(Duration::from_millis(10)).await;
            let shown = opt.container().find(&1.into()).unwrap();
            assert_eq!(shown.memo, "groceries");
            assert_eq!(shown.amount, "0.00");
        }
    );

    // The server's version replaces the speculative one.
    assert_eq!(result.unwrap().unwrap().amount, "42.10");
    assert_eq!(opt.container().find(&1.into()).unwrap().amount, "42.10");
}

#[tokio::test]
async fn failed_update_restores_snapshot() {
    let service = mock();
    service.on_update().reply(Err(rejected(400, "Memo too long")));
    let original = txn(1, "rent");
    let opt = coordinator(&service, vec![txn(2, "b"), original.clone()]);

    let err = opt
        .update(&1.into(), json!({ "memo": "x".repeat(500) }))
        .await
        .unwrap_err();

    assert_eq!(err.message(), "Memo too long");
    let c = opt.container();
    assert_eq!(c.items(), vec![txn(2, "b"), original]);
    assert_eq!(c.error().as_deref(), Some("Memo too long"));
    assert!(!c.state().updating());
}

#[tokio::test]
async fn update_of_unknown_record_is_not_speculated() {
    let service = mock();
    service.on_update().reply(Ok(txn(9, "remote")));
    let opt = coordinator(&service, vec![txn(1, "a")]);

    opt.update(&9.into(), json!({ "memo": "remote" }))
        .await
        .unwrap();

    assert_eq!(opt.container().items(), vec![txn(1, "a")]);
}

#[tokio::test]
async fn update_without_capability_delegates() {
    let service: Arc<MockService<Txn>> = Arc::new(MockService::with_capabilities(
        Capabilities::ALL.without(Operation::Update),
    ));
    let opt = coordinator(&service, vec![txn(1, "a")]);

    let result = opt.update(&1.into(), json!({ "memo": "b" })).await.unwrap();

    assert_eq!(result, None);
    assert_eq!(opt.container().items(), vec![txn(1, "a")]);
}

// ── Delete ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn failed_delete_puts_record_back() {
    let service = mock();
    service
        .on_delete()
        .reply_after(Duration::from_millis(100), Err(rejected(409, "Has splits")));
    let opt = coordinator(&service, vec![txn(1, "a"), txn(2, "b")]);

    let key: EntityKey = 2.into();
    let (result, ()) = tokio::join!(opt.delete(&key), async {
        sleep(Duration::from_millis(10)).await;
        assert_eq!(opt.container().find(&2.into()), None);
    });

    assert_eq!(result.unwrap_err().message(), "Has splits");
    // Restored at the front; the original position is not kept.
    assert_eq!(opt.container().items(), vec![txn(2, "b"), txn(1, "a")]);
}

#[tokio::test]
async fn delete_success_stays_removed() {
    let service = mock();
    let opt = coordinator(&service, vec![txn(1, "a"), txn(2, "b")]);

    assert!(opt.delete(&1.into()).await.unwrap());
    assert_eq!(opt.container().items(), vec![txn(2, "b")]);
}

// ── Per-key serialization ────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn overlapping_updates_of_one_key_end_with_the_later_success() {
    let service = mock();
    service
        .on_update()
        .reply_after(Duration::from_millis(100), Err(rejected(500, "flaky")));
    service
        .on_update()
        .reply_after(Duration::from_millis(50), Ok(txn(1, "second")));
    let opt = coordinator(&service, vec![txn(1, "original")]);

    let key: EntityKey = 1.into();
    let (first, second) = tokio::join!(
        opt.update(&key, json!({ "memo": "first" })),
        opt.update(&key, json!({ "memo": "second" })),
    );

    assert!(first.is_err());
    assert_eq!(second.unwrap(), Some(txn(1, "second")));
    assert_eq!(opt.container().items(), vec![txn(1, "second")]);
    assert_eq!(opt.keys_in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn different_keys_run_concurrently() {
    let service = mock();
    service
        .on_update()
        .reply_after(Duration::from_millis(100), Ok(txn(1, "x")));
    service
        .on_update()
        .reply_after(Duration::from_millis(100), Ok(txn(2, "y")));
    let opt = coordinator(&service, vec![txn(1, "a"), txn(2, "b")]);

    let started = tokio::time::Instant::now();
    let (key1, key2): (EntityKey, EntityKey) = (1.into(), 2.into());
    let (a, b, ()) = tokio::join!(
        opt.update(&key1, json!({ "memo": "x" })),
        opt.update(&key2, json!({ "memo": "y" })),
        async {
            sleep(Duration::from_millis(10)).await;
            assert_eq!(opt.keys_in_flight(), 2);
        }
    );

    a.unwrap();
    b.unwrap();
    assert!(started.elapsed() < Duration::from_millis(150));
    assert_eq!(opt.keys_in_flight(), 0);
}

#[tokio::test]
async fn serialization_can_be_disabled() {
    let service = mock();
    service.on_update().reply(Ok(txn(1, "b")));
    let c = container(&service);
    c.set_items(vec![txn(1, "a")]).unwrap();
    let opt = OptimisticCoordinator::with_config(
        Arc::new(c),
        OptimisticConfig {
            serialize_per_key: false,
        },
    );

    opt.update(&1.into(), json!({ "memo": "b" })).await.unwrap();

    assert_eq!(opt.keys_in_flight(), 0);
    assert_eq!(opt.container().items(), vec![txn(1, "b")]);
}
