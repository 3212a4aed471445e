use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tally_model::{ListResponse, ModelError, Pagination, QueryParams};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Txn {
    id: i64,
    amount: String,
}

// ── QueryParams ──────────────────────────────────────────────────

#[test]
fn merged_overrides_win() {
    let defaults = QueryParams::new().with("sort", "date").with("page_size", 20);
    let call = QueryParams::new().with("page_size", 50);
    let merged = defaults.merged(&call);
    assert_eq!(merged.get("sort"), Some(&json!("date")));
    assert_eq!(merged.get("page_size"), Some(&json!(50)));
    assert_eq!(merged.len(), 2);
}

#[test]
fn params_serialize_as_object() {
    let params = QueryParams::new().with("profile_id", "p1");
    assert_eq!(serde_json::to_value(&params).unwrap(), json!({"profile_id": "p1"}));
    assert_eq!(params.to_value(), json!({"profile_id": "p1"}));
    assert!(QueryParams::new().is_empty());
}

// ── ListResponse ─────────────────────────────────────────────────

#[test]
fn array_response_is_items() {
    let resp: ListResponse<Txn> =
        ListResponse::from_value(json!([{"id": 1, "amount": "2.00"}])).unwrap();
    assert_eq!(resp.items().len(), 1);
    assert_eq!(resp.total(), None);
}

#[test]
fn paged_response_is_page() {
    let resp: ListResponse<Txn> = ListResponse::from_value(json!({
        "data": [{"id": 1, "amount": "2.00"}, {"id": 2, "amount": "3.00"}],
        "total": 40
    }))
    .unwrap();
    match resp {
        ListResponse::Page { ref data, total } => {
            assert_eq!(data.len(), 2);
            assert_eq!(total, 40);
        }
        other => panic!("expected Page, got {other:?}"),
    }
}

#[test]
fn other_shapes_are_unrecognized() {
    let resp: ListResponse<Txn> = ListResponse::from_value(json!({"results": []})).unwrap();
    assert!(matches!(resp, ListResponse::Unrecognized(_)));
    assert!(resp.items().is_empty());

    let resp: ListResponse<Txn> = ListResponse::from_value(json!("nope")).unwrap();
    assert!(matches!(resp, ListResponse::Unrecognized(_)));

    let resp: ListResponse<Txn> =
        ListResponse::from_value(json!({"data": [], "total": "3"})).unwrap();
    assert!(matches!(resp, ListResponse::Unrecognized(_)));
}

#[test]
fn responses_serialize_to_their_wire_shape() {
    let page = json!({ "data": [{ "id": 1, "amount": "2.00" }], "total": 40 });
    let resp = ListResponse::<Txn>::from_value(page.clone()).unwrap();
    assert_eq!(serde_json::to_value(&resp).unwrap(), page);

    let items = ListResponse::Items(vec![Txn { id: 2, amount: "3.00".into() }]);
    assert_eq!(
        serde_json::to_value(&items).unwrap(),
        json!([{ "id": 2, "amount": "3.00" }])
    );

    let other = ListResponse::<Txn>::Unrecognized(json!({ "results": [] }));
    assert_eq!(serde_json::to_value(&other).unwrap(), json!({ "results": [] }));
}

#[test]
fn malformed_elements_are_errors() {
    let err = ListResponse::<Txn>::from_value(json!([{"id": "x"}])).unwrap_err();
    assert!(matches!(err, ModelError::Serialization(_)));
}

// ── Pagination ───────────────────────────────────────────────────

#[test]
fn total_pages_rounds_up() {
    let p = Pagination::new(1, 20).with_total(41);
    assert_eq!(p.total, 41);
    assert_eq!(p.total_pages, 3);
}

#[test]
fn total_pages_exact_division() {
    assert_eq!(Pagination::pages_for(40, 20), 2);
    assert_eq!(Pagination::pages_for(0, 20), 0);
}

#[test]
fn zero_page_size_has_no_pages() {
    assert_eq!(Pagination::pages_for(10, 0), 0);
}

#[test]
fn cursor_params() {
    let params = Pagination::new(3, 25).to_params();
    assert_eq!(params.get(QueryParams::PAGE), Some(&json!(3)));
    assert_eq!(params.get(QueryParams::PAGE_SIZE), Some(&json!(25)));
}

proptest! {
    #[test]
    fn pages_cover_total(total in 0u64..1_000_000, size in 1u32..500) {
        let pages = u64::from(Pagination::pages_for(total, size));
        prop_assert!(pages * u64::from(size) >= total);
        prop_assert!(pages == 0 || (pages - 1) * u64::from(size) < total);
    }
}
