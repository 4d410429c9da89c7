//! The YATA list-CRDT integration algorithm (§4.3) and item
//! deletion/split (§4.4).
//!
//! Grounded on `josephg-diamond-types/src/yjs/doc.rs`'s experimental
//! `integrate()` for the overall cursor-scan shape (maintain a left
//! candidate, scan right comparing origins, stop on the first
//! non-conflicting neighbor), reworked against this crate's `Id`-keyed
//! [`crate::store::OpStore`] instead of a range-tree cursor, per the
//! item-chain design spec.md §9 calls for.

use std::collections::HashSet;

use crate::delete_store::DeleteStore;
use crate::id::Id;
use crate::item::Item;
use crate::store::OpStore;

/// Integrates a freshly-created (local) or decoded (remote) item into
/// its parent's child list. `item.id` must already be assigned and
/// `item.left`/`item.right` may be pre-seeded (e.g. from a local split
/// of the predecessor); everything else is computed here. Returns the
/// item's id once stored.
///
/// Top-level type roots (`item.parent.is_none()`) skip the scan
/// entirely: they are not part of any child list.
pub fn integrate(store: &mut OpStore, mut item: Item) -> Id {
    let id = item.id.clone();

    let Some(parent_id) = item.parent.clone() else {
        store.put(item);
        return id;
    };

    let mut o: Option<Id> = if let Some(left) = &item.left {
        store.get(left).and_then(|l| l.right.clone())
    } else if let Some(key) = &item.parent_key {
        store
            .get(&parent_id)
            .and_then(|p| p.type_state())
            .and_then(|ts| ts.map.get(key).cloned())
    } else {
        store
            .get(&parent_id)
            .and_then(|p| p.type_state())
            .and_then(|ts| ts.start.clone())
    };

    let mut conflicting: HashSet<Id> = HashSet::new();
    let mut items_before_origin: HashSet<Id> = HashSet::new();

    loop {
        let Some(o_id) = o.clone() else { break };
        if item.right_origin.as_ref() == Some(&o_id) {
            break;
        }
        let o_item = store
            .get(&o_id)
            .expect("integrate: neighbor id not present in store")
            .clone();

        items_before_origin.insert(o_id.clone());
        conflicting.insert(o_id.clone());

        if o_item.origin == item.origin {
            // Case A: true conflict at the same origin. Lower client id
            // loses and is placed to the right of the higher one.
            let o_client = o_id.client().expect("child item ids are never roots");
            let x_client = id.client().expect("child item ids are never roots");
            if o_client < x_client {
                item.left = Some(o_id.clone());
                conflicting.clear();
            }
        } else if o_item
            .origin
            .as_ref()
            .is_some_and(|oo| items_before_origin.contains(oo) && !conflicting.contains(oo))
        {
            // Case B: o originates behind x's origin (already scanned
            // past it without it becoming a live conflict).
            item.left = Some(o_id.clone());
            conflicting.clear();
        } else {
            // Case C.
            break;
        }

        o = o_item.right.clone();
    }

    item.right = if let Some(left) = &item.left {
        store.get(left).and_then(|l| l.right.clone())
    } else if let Some(key) = &item.parent_key {
        store
            .get(&parent_id)
            .and_then(|p| p.type_state())
            .and_then(|ts| ts.map.get(key).cloned())
    } else {
        store
            .get(&parent_id)
            .and_then(|p| p.type_state())
            .and_then(|ts| ts.start.clone())
    };

    if let Some(left) = &item.left {
        store.get_mut(left).unwrap().right = Some(id.clone());
    }
    if let Some(right) = &item.right {
        store.get_mut(right).unwrap().left = Some(id.clone());
    }
    if item.left.is_none() {
        let parent = store.get_mut(&parent_id).expect("parent must exist");
        let ts = parent
            .type_state_mut()
            .expect("parent must be a type-content item");
        match &item.parent_key {
            Some(key) => {
                ts.map.insert(key.clone(), id.clone());
            }
            None => ts.start = Some(id.clone()),
        }
    }

    store.put(item);
    id
}

/// Deletes the item at `id`: sets its tombstone flag and marks the
/// range in the delete store (§4.4). Returns `false` if the item was
/// already deleted (idempotent).
pub fn delete(store: &mut OpStore, deletes: &mut DeleteStore, id: &Id) -> bool {
    let Some(item) = store.get_mut(id) else {
        return false;
    };
    if item.deleted {
        return false;
    }
    item.deleted = true;
    let len = item.len();
    if let Some(client) = id.client() {
        let clock = id.clock().unwrap();
        deletes.mark(client, clock, len, false);
    }
    true
}

/// Splits the item at `key` at offset `d` (`0 < d < len`). Relinking of
/// immediate left/right neighbors is handled by
/// [`OpStore::split_raw`]; no other item's `origin` needs updating
/// because origins are stable `Id` values here, not object references
/// (see DESIGN.md, Open Question 3).
pub fn split_at(store: &mut OpStore, key: &Id, d: u32) -> (Id, Id) {
    store.split_raw(key, d)
}
