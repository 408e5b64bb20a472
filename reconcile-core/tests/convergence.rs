//! End-to-end behaviour of the authority: scenarios, convergence and clock
//! properties.

use proptest::prelude::*;
use reconcile_core::{
    Author, ClientReconciler, ConversationStore, DocumentId, Edit, EditPayload, Operation, Origin,
    Tick,
};
use std::sync::Arc;

fn doc() -> DocumentId {
    DocumentId::new("conversation")
}

#[test]
fn test_stale_insert_lands_after_unseen_insert() {
    let store = ConversationStore::new();

    let a = store.commit(&Edit::new(Author::Alice, doc(), EditPayload::insert(0, "hello"), Origin::ZERO));
    assert_eq!(a.text, "hello");
    assert_eq!(a.origin, Origin::ZERO.with(Author::Alice, 1));

    // Bob never saw Alice's edit.
    let b = store.commit(&Edit::new(Author::Bob, doc(), EditPayload::insert(0, "X"), Origin::ZERO));
    assert_eq!(b.edit.payload.position, 5);
    assert_eq!(b.text, "helloX");
}

#[test]
fn test_stale_insert_after_unseen_delete() {
    let store = ConversationStore::new();
    let base = store.commit(&Edit::new(Author::Bob, doc(), EditPayload::insert(0, "abcdef"), Origin::ZERO));
    let seen = base.origin;

    let a = store.commit(&Edit::new(Author::Alice, doc(), EditPayload::delete(1, 2), seen));
    assert_eq!(a.text, "adef");
    assert_eq!(a.origin, seen.advanced(Author::Alice));

    let b = store.commit(&Edit::new(Author::Bob, doc(), EditPayload::insert(5, "Z"), seen));
    assert_eq!(b.edit.payload.position, 3);
    assert_eq!(b.text, "adeZf");
}

#[test]
fn test_deleted_document_starts_fresh() {
    let store = ConversationStore::new();
    store.commit(&Edit::new(Author::Alice, doc(), EditPayload::insert(0, "old"), Origin::ZERO));
    store.commit(&Edit::new(Author::Bob, doc(), EditPayload::insert(3, "er"), Origin::ZERO));
    store.delete(&doc()).unwrap();

    let receipt = store.commit(&Edit::new(Author::Bob, doc(), EditPayload::insert(0, "new"), Origin::ZERO));
    assert_eq!(receipt.edit.origin, Origin::ZERO);
    assert_eq!(receipt.origin, Origin::ZERO.with(Author::Bob, 1));
    assert_eq!(receipt.text, "new");
    assert_eq!(store.operation_log(&doc()).unwrap().len(), 1);
}

#[test]
fn test_self_author_edits_never_shift_own_edit() {
    let store = ConversationStore::new();
    store.commit(&Edit::new(Author::Alice, doc(), EditPayload::insert(0, "one"), Origin::ZERO));
    store.commit(&Edit::new(Author::Alice, doc(), EditPayload::insert(3, "two"), Origin::ZERO));

    let receipt = store.commit(&Edit::new(Author::Alice, doc(), EditPayload::insert(0, ">"), Origin::ZERO));
    assert_eq!(receipt.edit.payload.position, 0);
    assert_eq!(receipt.text, ">onetwo");
}

#[test]
fn test_overlapping_delete_clamps_to_start() {
    let store = ConversationStore::new();
    let base = store.commit(&Edit::new(Author::Bob, doc(), EditPayload::insert(0, "abcdef"), Origin::ZERO));

    store.commit(&Edit::new(Author::Alice, doc(), EditPayload::delete(0, 5), base.origin));
    let receipt = store.commit(&Edit::new(Author::Bob, doc(), EditPayload::delete(2, 3), base.origin));

    // 2 - 5 saturates at 0; the delete is then clamped to the one remaining char.
    assert_eq!(receipt.edit.payload, EditPayload::delete(0, 1));
    assert_eq!(receipt.text, "");
}

#[test]
fn test_commits_to_different_documents_run_in_parallel() {
    let store = Arc::new(ConversationStore::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            std::thread::spawn(move || {
                let id = DocumentId::new(format!("doc-{i}"));
                let mut origin = Origin::ZERO;
                for n in 0..50 {
                    let receipt = store.commit(&Edit::new(
                        Author::Alice,
                        id.clone(),
                        EditPayload::insert(n, "x"),
                        origin,
                    ));
                    origin = receipt.origin;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 8);
    for snapshot in store.list_snapshots() {
        assert_eq!(snapshot.text.len(), 50);
    }
}

#[test]
fn test_concurrent_commits_to_one_document_are_serialized() {
    let store = Arc::new(ConversationStore::new());
    let handles: Vec<_> = Author::ALL
        .into_iter()
        .map(|author| {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    store.commit(&Edit::new(author, doc(), EditPayload::insert(0, "x"), Origin::ZERO));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let origin = store.origin(&doc());
    assert_eq!(origin, Origin::ZERO.with(Author::Alice, 100).with(Author::Bob, 100));
    let log = store.operation_log(&doc()).unwrap();
    assert_eq!(log.len(), 200);
    assert_eq!(log.replay(), store.snapshot(&doc()).unwrap().text);
}

#[test]
fn test_client_mirrors_committed_edits() {
    let store = ConversationStore::new();
    let mut client = ClientReconciler::new(doc());

    let first = store.commit(&Edit::new(Author::Alice, doc(), EditPayload::insert(0, "hello"), Origin::ZERO));
    let second = store.commit(&Edit::new(Author::Bob, doc(), EditPayload::insert(0, "!"), Origin::ZERO));
    client.enqueue(first.edit);
    client.enqueue(second.edit);

    while client.tick() != Tick::Flushed {}
    assert_eq!(client.text(), store.snapshot(&doc()).unwrap().text);
}

/// Any edit that fits a text of `len` chars; inserts draw from `alphabet`.
fn payload_within(len: usize, alphabet: &'static str) -> impl Strategy<Value = EditPayload> {
    prop_oneof![
        3 => (0..=len, alphabet).prop_map(|(position, text)| EditPayload::insert(position, text)),
        3 => (0..len)
            .prop_flat_map(move |position| (Just(position), 1..=len - position))
            .prop_map(|(position, length)| EditPayload::delete(position, length)),
        1 => (0..=len).prop_map(EditPayload::undo),
        1 => (0..=len).prop_map(EditPayload::redo),
    ]
}

/// True when neither edit touches text the other one does. An insert sits
/// in the gap before its position; a delete owns `position..position + length`.
fn disjoint(a: &EditPayload, b: &EditPayload) -> bool {
    let outside = |at: usize, start: usize, length: usize| at < start || at >= start + length;
    match (&a.operation, &b.operation) {
        (Operation::Undo | Operation::Redo, _) | (_, Operation::Undo | Operation::Redo) => true,
        (Operation::Insert { .. }, Operation::Insert { .. }) => a.position != b.position,
        (Operation::Insert { .. }, Operation::Delete { length }) => {
            outside(a.position, b.position, *length)
        }
        (Operation::Delete { length }, Operation::Insert { .. }) => {
            outside(b.position, a.position, *length)
        }
        (Operation::Delete { length: a_len }, Operation::Delete { length: b_len }) => {
            a.position + a_len <= b.position || b.position + b_len <= a.position
        }
    }
}

fn concurrent_pair() -> impl Strategy<Value = (String, EditPayload, EditPayload)> {
    "[a-z]{4,20}".prop_flat_map(|base| {
        let len = base.chars().count();
        (Just(base), payload_within(len, "[A-M]{1,5}"), payload_within(len, "[N-Z]{1,5}"))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Two concurrent edits on disjoint ranges converge whichever commits
    /// first, and the log replays to the same text either way.
    #[test]
    fn disjoint_edits_converge((base, a_payload, b_payload) in concurrent_pair()) {
        prop_assume!(disjoint(&a_payload, &b_payload));

        let run = |alice_first: bool| {
            let store = ConversationStore::new();
            let seen = store
                .commit(&Edit::new(Author::Alice, doc(), EditPayload::insert(0, base.clone()), Origin::ZERO))
                .origin;
            let a = Edit::new(Author::Alice, doc(), a_payload.clone(), seen);
            let b = Edit::new(Author::Bob, doc(), b_payload.clone(), seen);
            let last = if alice_first {
                store.commit(&a);
                store.commit(&b)
            } else {
                store.commit(&b);
                store.commit(&a)
            };
            assert_eq!(store.operation_log(&doc()).unwrap().replay(), last.text);
            last.text
        };

        prop_assert_eq!(run(true), run(false));
    }

    /// Undo and Redo leave the text to the concurrent edit alone.
    #[test]
    fn history_markers_do_not_disturb_concurrent_edit(
        (base, payload, _) in concurrent_pair(),
        marker_pos in 0usize..25,
        redo in any::<bool>(),
    ) {
        let marker = if redo { EditPayload::redo(marker_pos) } else { EditPayload::undo(marker_pos) };
        let alone = {
            let mut text = base.clone();
            payload.apply_to(&mut text);
            text
        };

        for marker_first in [true, false] {
            let store = ConversationStore::new();
            let seen = store
                .commit(&Edit::new(Author::Bob, doc(), EditPayload::insert(0, base.clone()), Origin::ZERO))
                .origin;
            let edit = Edit::new(Author::Alice, doc(), payload.clone(), seen);
            let marker = Edit::new(Author::Bob, doc(), marker.clone(), seen);
            let last = if marker_first {
                store.commit(&marker);
                store.commit(&edit)
            } else {
                store.commit(&edit);
                store.commit(&marker)
            };
            prop_assert_eq!(&last.text, &alone);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every commit bumps exactly its author's counter by one.
    #[test]
    fn clock_is_monotonic(
        edits in prop::collection::vec((any::<bool>(), 0usize..30, "[a-z]{0,4}", any::<bool>()), 1..40),
    ) {
        let store = ConversationStore::new();
        let mut previous = Origin::ZERO;
        for (is_alice, position, text, is_insert) in edits {
            let author = if is_alice { Author::Alice } else { Author::Bob };
            let payload = if is_insert {
                EditPayload::insert(position, text)
            } else {
                EditPayload::delete(position, text.len())
            };
            let receipt = store.commit(&Edit::new(author, doc(), payload, Origin::ZERO));

            prop_assert_eq!(receipt.edit.origin, previous);
            prop_assert_eq!(receipt.origin, previous.advanced(author));
            previous = receipt.origin;
        }
    }

    /// Replaying the log twice yields the same text as the cached snapshot.
    #[test]
    fn replay_matches_cache(
        edits in prop::collection::vec((any::<bool>(), 0usize..30, "[a-z]{1,4}"), 1..40),
    ) {
        let store = ConversationStore::new();
        for (is_alice, position, text) in edits {
            let author = if is_alice { Author::Alice } else { Author::Bob };
            let origin = store.origin(&doc());
            store.commit(&Edit::new(author, doc(), EditPayload::insert(position, text), origin));
        }

        let log = store.operation_log(&doc()).unwrap();
        let first = log.replay();
        prop_assert_eq!(&first, &log.replay());
        prop_assert_eq!(first, store.snapshot(&doc()).unwrap().text);
    }
}
