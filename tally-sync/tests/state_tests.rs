mod common;

use common::{txn, Txn};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use tally_model::{IdField, ListResponse, Pagination};
use tally_sync::{reduce, Busy, CrudAction, CrudState};
use tally_types::EntityKey;

fn id() -> IdField {
    IdField::default()
}

fn apply(state: CrudState<Txn>, action: CrudAction<Txn>) -> CrudState<Txn> {
    reduce(&state, action, &id()).unwrap()
}

// ── Busy flags ───────────────────────────────────────────────────

#[test]
fn busy_classes_are_independent() {
    let state = CrudState::<Txn>::default();
    let state = apply(state, CrudAction::Begin(Busy::Creating));
    let state = apply(state, CrudAction::Begin(Busy::Deleting));

    assert!(state.creating());
    assert!(state.deleting());
    assert!(!state.loading());
    assert!(!state.updating());

    let state = apply(state, CrudAction::Created(txn(1, "a")));
    assert!(!state.creating());
    assert!(state.deleting());
    assert!(state.is_busy());
}

#[test]
fn overlapping_operations_of_one_class() {
    let state = CrudState::<Txn>::default();
    let state = apply(state, CrudAction::Begin(Busy::Updating));
    let state = apply(state, CrudAction::Begin(Busy::Updating));
    let state = apply(
        state,
        CrudAction::Failed {
            busy: Busy::Updating,
            message: "first failed".into(),
        },
    );
    assert!(state.updating());
    assert_eq!(state.error(), Some("first failed"));

    let state = apply(state, CrudAction::Cancel(Busy::Updating));
    assert!(!state.updating());
}

#[test]
fn cancel_without_begin_saturates() {
    let state = apply(CrudState::default(), CrudAction::Cancel(Busy::Loading));
    assert!(!state.loading());
    let state = apply(state, CrudAction::Begin(Busy::Loading));
    assert!(state.loading());
}

#[test]
fn begin_load_clears_error_other_classes_do_not() {
    let state = apply(CrudState::default(), CrudAction::SetError("boom".into()));
    let state = apply(state, CrudAction::Begin(Busy::Creating));
    assert_eq!(state.error(), Some("boom"));

    let state = apply(state, CrudAction::Begin(Busy::Loading));
    assert_eq!(state.error(), None);
}

// ── Items ────────────────────────────────────────────────────────

#[test]
fn reduce_leaves_input_untouched() {
    let before = apply(CrudState::default(), CrudAction::SetItems(vec![txn(1, "a")]));
    let after = reduce(&before, CrudAction::RemoveItem(1.into()), &id()).unwrap();

    assert_eq!(before.len(), 1);
    assert!(after.is_empty());
}

#[test]
fn failed_transition_returns_error() {
    let state = CrudState::<serde_json::Value>::default();
    let result = reduce(
        &state,
        CrudAction::AddItem(serde_json::json!({ "id": true })),
        &id(),
    );
    assert!(result.is_err());
}

#[test]
fn load_with_page_updates_cursor() {
    let state = CrudState::<Txn>::new(Some(Pagination::new(2, 10)));
    let state = apply(state, CrudAction::Begin(Busy::Loading));
    let state = apply(
        state,
        CrudAction::LoadSucceeded {
            response: ListResponse::Page {
                data: vec![txn(11, "k")],
                total: 11,
            },
            paginated: true,
        },
    );

    assert_eq!(state.items(), &[txn(11, "k")]);
    let page = state.pagination().unwrap();
    assert_eq!((page.page, page.total, page.total_pages), (2, 11, 2));
    assert!(!state.loading());
}

#[test]
fn updated_replaces_every_duplicate() {
    let state = apply(
        CrudState::default(),
        CrudAction::SetItems(vec![txn(1, "a"), txn(2, "b"), txn(1, "a-dup")]),
    );
    let state = apply(state, CrudAction::UpdateItem(txn(1, "z")));
    assert_eq!(state.items(), &[txn(1, "z"), txn(2, "b"), txn(1, "z")]);
}

#[test]
fn update_of_absent_record_does_not_insert() {
    let state = apply(CrudState::default(), CrudAction::SetItems(vec![txn(1, "a")]));
    let state = apply(state, CrudAction::Begin(Busy::Updating));
    let state = apply(state, CrudAction::Updated(txn(5, "ghost")));
    assert_eq!(state.items(), &[txn(1, "a")]);
}

#[test]
fn deleted_clears_matching_selection_only() {
    let state = apply(
        CrudState::default(),
        CrudAction::SetItems(vec![txn(1, "a"), txn(2, "b")]),
    );
    let state = apply(state, CrudAction::Select(Some(txn(1, "a"))));

    let state = apply(state, CrudAction::Deleted(2.into()));
    assert_eq!(state.selected_key(), Some(&EntityKey::from(1)));

    let state = apply(state, CrudAction::Deleted(1.into()));
    assert_eq!(state.selected_item(), None);
    assert!(state.is_empty());
}

#[test]
fn set_page_without_cursor_is_ignored() {
    let state = apply(CrudState::<Txn>::default(), CrudAction::SetPage(4));
    assert!(state.pagination().is_none());
}

#[test]
fn reset_keeps_page_size() {
    let state = CrudState::<Txn>::new(Some(Pagination::new(1, 25)));
    let state = apply(state, CrudAction::SetPage(7));
    let state = apply(state, CrudAction::AddItem(txn(1, "a")));
    let state = apply(state, CrudAction::Reset);

    assert!(state.is_empty());
    assert_eq!(state.pagination(), Some(&Pagination::new(1, 25)));
}

#[test]
fn reset_keeps_running_operations_counted() {
    let state = CrudState::<Txn>::default();
    let state = apply(state, CrudAction::Begin(Busy::Creating));
    let state = apply(state, CrudAction::Reset);

    assert!(state.creating());
    assert_eq!(state.epoch(), 1);

    let state = apply(state, CrudAction::Begin(Busy::Creating));
    let state = apply(state, CrudAction::Cancel(Busy::Creating));
    assert!(state.creating());

    let state = apply(state, CrudAction::Created(txn(2, "after")));
    assert!(!state.creating());
}

// ── Properties ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Edit {
    Add(i64),
    Remove(i64),
    Update(i64),
    Fetch(i64),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0i64..6).prop_map(Edit::Add),
        (0i64..6).prop_map(Edit::Remove),
        (0i64..6).prop_map(Edit::Update),
        (0i64..6).prop_map(Edit::Fetch),
    ]
}

proptest! {
    #[test]
    fn keys_track_items(edits in prop::collection::vec(edit(), 0..40)) {
        let mut state = CrudState::<Txn>::default();
        for (n, e) in edits.into_iter().enumerate() {
            let memo = format!("v{n}");
            let action = match e {
                Edit::Add(id) => CrudAction::AddItem(txn(id, &memo)),
                Edit::Remove(id) => CrudAction::RemoveItem(id.into()),
                Edit::Update(id) => CrudAction::UpdateItem(txn(id, &memo)),
                Edit::Fetch(id) => CrudAction::Fetched(txn(id, &memo)),
            };
            state = apply(state, action);
        }

        let expected: Vec<EntityKey> = state.items().iter().map(|t| t.id.into()).collect();
        prop_assert_eq!(state.keys(), expected.as_slice());
    }

    #[test]
    fn balanced_begin_and_settle_leave_state_idle(n in 0usize..10) {
        let mut state = CrudState::<Txn>::default();
        for _ in 0..n {
            state = apply(state, CrudAction::Begin(Busy::Loading));
            state = apply(state, CrudAction::Begin(Busy::Deleting));
        }
        for _ in 0..n {
            state = apply(state, CrudAction::Cancel(Busy::Deleting));
            state = apply(
                state,
                CrudAction::LoadSucceeded {
                    response: ListResponse::Items(Vec::new()),
                    paginated: false,
                },
            );
        }
        prop_assert!(!state.is_busy());
    }
}
