//! Relative positions (§4.11): an index-free cursor that survives
//! concurrent edits upstream of it, used by bindings to restore
//! selection across remote updates.

use crate::id::Id;
use crate::store::OpStore;

/// Either a specific position inside an item, or the sentinel meaning
/// "after the last visible child" of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelativePosition {
    Inside(Id),
    EndOf(Id),
}

impl RelativePosition {
    /// Builds a cursor for the item covering `index` visible units into
    /// `parent`'s child list, or `EndOf(parent)` if `index` is at or
    /// past the end.
    pub fn from_index(store: &OpStore, parent: &Id, index: u32) -> RelativePosition {
        let mut cur = store
            .get(parent)
            .and_then(|p| p.type_state())
            .and_then(|ts| ts.start.clone());
        let mut remaining = index;
        while let Some(id) = cur {
            let item = store.get(&id).expect("dangling child pointer");
            if !item.deleted && item.countable() {
                let len = item.len();
                if remaining < len {
                    return RelativePosition::Inside(id.with_offset(remaining));
                }
                remaining -= len;
            }
            cur = item.right.clone();
        }
        RelativePosition::EndOf(parent.clone())
    }

    /// Resolves this cursor back to a visible index, walking from the
    /// item it names (following `redone` first, per §4.10's redo
    /// chains) leftward and summing visible lengths ahead of it.
    pub fn resolve(&self, store: &OpStore, parent: &Id) -> Option<u32> {
        match self {
            RelativePosition::EndOf(p) => {
                if p == parent {
                    Some(super::types::visible_len(store, parent))
                } else {
                    None
                }
            }
            RelativePosition::Inside(id) => {
                let target = current_incarnation(store, id);
                let item = store.get_item(&target)?;
                if item.parent.as_ref() != Some(parent) {
                    return None;
                }
                let mut count = target_offset(store, &target);
                let mut cur = item.left.clone();
                while let Some(left_id) = cur {
                    let left_item = store.get(&left_id)?;
                    if !left_item.deleted && left_item.countable() {
                        count += left_item.len();
                    }
                    cur = left_item.left.clone();
                }
                Some(count)
            }
        }
    }
}

/// Follows `redone` pointers forward to the live replacement of a
/// possibly-undone-and-redone item. Also used by [`crate::undo`] to
/// resolve a clone-and-reattach target through a prior redo.
pub(crate) fn current_incarnation(store: &OpStore, id: &Id) -> Id {
    let mut cur = id.clone();
    while let Some(item) = store.get(&cur) {
        match &item.redone {
            Some(next) => cur = next.clone(),
            None => break,
        }
    }
    cur
}

fn target_offset(store: &OpStore, id: &Id) -> u32 {
    store
        .get_item_key(id)
        .and_then(|key| id.clock().zip(key.clock()))
        .map(|(c, k)| c - k)
        .unwrap_or(0)
}
