//! End-to-end scenarios (S1-S6) exercised against the public
//! `Replica`/`YArray`/`YMap`/`YText`/`UndoManager` surface, mirroring
//! how two independent peers would actually exchange updates rather
//! than poking the item chain directly (see the lower-level versions
//! of these same scenarios in `integrate.rs`, `text.rs`, `map.rs`).

use std::collections::BTreeMap;

use serde_json::Value;

use weave_core::codec::StructRecord;
use weave_core::content::Content;
use weave_core::delta::{DeltaOp, InsertContent};
use weave_core::id::Id;
use weave_core::item::Item;
use weave_core::{IntegrateOutcome, Replica, ReplicaOptions, UndoManager, UndoOptions};
use weave_json_equal::deep_equal;

/// Exchanges updates in both directions until both replicas agree on
/// each other's state vector, the way a real transport would after a
/// round of sync-step1/sync-step2.
fn sync(a: &mut Replica, b: &mut Replica) {
    let to_b = a.missing_structs(b.state_vector());
    let to_a = b.missing_structs(a.state_vector());
    a.apply_remote_structs(to_a);
    b.apply_remote_structs(to_b);
}

#[test]
fn s1_concurrent_insert_at_same_origin() {
    let _ = env_logger::try_init();

    let mut a = Replica::new(ReplicaOptions { client_id: Some(1), ..Default::default() });
    let mut b = Replica::new(ReplicaOptions { client_id: Some(2), ..Default::default() });
    let arr_a = a.define_array("list").unwrap();
    let arr_b = b.define_array("list").unwrap();

    a.transact(|tx| arr_a.insert(tx, 0, vec![Value::from("x")]).unwrap());
    b.transact(|tx| arr_b.insert(tx, 0, vec![Value::from("y")]).unwrap());

    sync(&mut a, &mut b);

    // A's client id (1) is lower than B's (2): A's insert loses the tie
    // and ends up to the right.
    let expected = Value::Array(vec![Value::from("y"), Value::from("x")]);
    assert!(deep_equal(&arr_a.to_json(a.store()), &expected));
    assert!(deep_equal(&arr_b.to_json(b.store()), &expected));
}

#[test]
fn s1_order_independent_of_which_client_id_is_higher() {
    let mut a = Replica::new(ReplicaOptions { client_id: Some(9), ..Default::default() });
    let mut b = Replica::new(ReplicaOptions { client_id: Some(3), ..Default::default() });
    let arr_a = a.define_array("list").unwrap();
    let arr_b = b.define_array("list").unwrap();

    a.transact(|tx| arr_a.insert(tx, 0, vec![Value::from("x")]).unwrap());
    b.transact(|tx| arr_b.insert(tx, 0, vec![Value::from("y")]).unwrap());

    sync(&mut a, &mut b);

    // Now A (9) > B (3): B's insert loses the tie and ends up right.
    let expected = Value::Array(vec![Value::from("x"), Value::from("y")]);
    assert!(deep_equal(&arr_a.to_json(a.store()), &expected));
    assert!(deep_equal(&arr_b.to_json(b.store()), &expected));
}

#[test]
fn s2_interleaved_text_edits() {
    let mut a = Replica::new(ReplicaOptions { client_id: Some(1), ..Default::default() });
    let mut b = Replica::new(ReplicaOptions { client_id: Some(2), ..Default::default() });
    let text_a = a.define_text("doc").unwrap();
    let text_b = b.define_text("doc").unwrap();

    a.transact(|tx| text_a.insert(tx, 0, "abc", None).unwrap());
    sync(&mut a, &mut b);
    assert_eq!(text_b.to_string(b.store()), "abc");

    // Concurrent edits anchored at different origins ('a'|'b' vs
    // 'b'|'c') never conflict, so the merge order is unambiguous.
    a.transact(|tx| text_a.insert(tx, 1, "X", None).unwrap());
    b.transact(|tx| text_b.insert(tx, 2, "Y", None).unwrap());

    sync(&mut a, &mut b);

    assert_eq!(text_a.to_string(a.store()), "aXbYc");
    assert_eq!(text_b.to_string(b.store()), "aXbYc");
}

#[test]
fn s3_delete_then_undo_then_redo() {
    let mut replica = Replica::new(ReplicaOptions { client_id: Some(1), ..Default::default() });
    let text = replica.define_text("doc").unwrap();
    let handle = replica.attach_undo_manager(UndoManager::new(vec![text.root.clone()], UndoOptions::default()));

    replica.transact(|tx| text.insert(tx, 0, "hello", None).unwrap());
    assert_eq!(text.to_string(replica.store()), "hello");

    replica.transact(|tx| text.delete(tx, 1, 3).unwrap());
    assert_eq!(text.to_string(replica.store()), "ho");

    assert!(replica.undo(handle));
    assert_eq!(text.to_string(replica.store()), "hello");

    assert!(replica.redo(handle));
    assert_eq!(text.to_string(replica.store()), "ho");
}

#[test]
fn s4_formatting_survives_a_concurrent_delete() {
    let mut a = Replica::new(ReplicaOptions { client_id: Some(1), ..Default::default() });
    let mut b = Replica::new(ReplicaOptions { client_id: Some(2), ..Default::default() });
    let text_a = a.define_text("doc").unwrap();
    let text_b = b.define_text("doc").unwrap();

    a.transact(|tx| text_a.insert(tx, 0, "abcdef", None).unwrap());
    sync(&mut a, &mut b);
    assert_eq!(text_b.to_string(b.store()), "abcdef");

    // A bolds the whole range; B concurrently deletes "cd" before
    // seeing A's formatting.
    a.transact(|tx| {
        let mut attrs = BTreeMap::new();
        attrs.insert("bold".to_string(), Value::Bool(true));
        text_a.format(tx, 0, 6, attrs).unwrap();
    });
    b.transact(|tx| text_b.delete(tx, 2, 2).unwrap());

    sync(&mut a, &mut b);

    for (label, text, store) in [("a", &text_a, a.store()), ("b", &text_b, b.store())] {
        let delta = text.to_delta(store);
        assert_eq!(delta.len(), 1, "replica {label}: {delta:?}");
        match &delta[0] {
            DeltaOp::Insert { content: InsertContent::Text(s), attributes } => {
                assert_eq!(s, "abef", "replica {label}");
                assert_eq!(attributes.get("bold"), Some(&Value::Bool(true)), "replica {label}");
            }
            other => panic!("replica {label}: expected a single bold text insert, got {other:?}"),
        }
    }
}

#[test]
fn s5_out_of_order_delivery_parks_then_resolves() {
    let mut a = Replica::new(ReplicaOptions { client_id: Some(9), ..Default::default() });
    let mut b = Replica::new(ReplicaOptions { client_id: Some(1), ..Default::default() });
    let text_a = a.define_text("doc").unwrap();
    let text_b = b.define_text("doc").unwrap();

    a.transact(|tx| text_a.insert(tx, 0, "a", None).unwrap());
    a.transact(|tx| text_a.insert(tx, 1, "b", None).unwrap());
    assert_eq!(text_a.to_string(a.store()), "ab");

    let first = StructRecord::Item(Item::new(
        Id::normal(9, 0),
        None,
        None,
        Some(text_b.root.clone()),
        None,
        Content::Str("a".into()),
    ));
    let second = StructRecord::Item(Item::new(
        Id::normal(9, 1),
        Some(Id::normal(9, 0)),
        None,
        Some(text_b.root.clone()),
        None,
        Content::Str("b".into()),
    ));

    // B receives the second item before the first: it has to park
    // until its origin arrives.
    let outcomes = b.apply_remote_structs(vec![second]);
    assert_eq!(outcomes, vec![IntegrateOutcome::Parked]);
    assert_eq!(text_b.to_string(b.store()), "");

    let outcomes = b.apply_remote_structs(vec![first]);
    assert_eq!(outcomes, vec![IntegrateOutcome::Applied]);
    assert_eq!(text_b.to_string(b.store()), text_a.to_string(a.store()));
}

#[test]
fn s6_concurrent_map_write_higher_client_wins_but_both_retained() {
    let mut a = Replica::new(ReplicaOptions { client_id: Some(1), ..Default::default() });
    let mut b = Replica::new(ReplicaOptions { client_id: Some(2), ..Default::default() });
    let map_a = a.define_map("doc").unwrap();
    let map_b = b.define_map("doc").unwrap();

    a.transact(|tx| map_a.set(tx, "k", Value::from(1)).unwrap());
    b.transact(|tx| map_b.set(tx, "k", Value::from(2)).unwrap());

    sync(&mut a, &mut b);

    assert!(deep_equal(&map_a.get(a.store(), "k").unwrap(), &Value::from(2)));
    assert!(deep_equal(&map_b.get(b.store(), "k").unwrap(), &Value::from(2)));
    assert_eq!(map_a.keys(a.store()), vec!["k".to_string()]);
    assert_eq!(map_b.keys(b.store()), vec!["k".to_string()]);

    // the loser (client 1's write) is still in the chain, not erased.
    let head = a
        .store()
        .get(&map_a.root)
        .unwrap()
        .type_state()
        .unwrap()
        .map
        .get("k")
        .cloned()
        .unwrap();
    let loser = a.store().get(&head).unwrap().right.clone();
    assert_eq!(loser, Some(Id::normal(1, 0)));
}
