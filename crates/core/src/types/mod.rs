//! Shared child-list types built atop [`crate::item::Item`] (§4.5, §4.6,
//! §3 "Shared types"): array, map, text-with-formatting, and the XML
//! tree variants.
//!
//! Generalizes the teacher's `json_crdt::nodes` family (`ArrNode`,
//! `ObjNode`, `StrNode`, `VecNode`) from last-writer-wins semantics to
//! the item-chain semantics this engine's list CRDT requires.

pub mod array;
pub mod map;
pub mod text;
pub mod xml;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::content::Content;
use crate::error::WeaveError;
use crate::id::Id;
use crate::store::OpStore;

pub use array::YArray;
pub use map::YMap;
pub use text::YText;
pub use xml::{YXmlElement, YXmlFragment, YXmlHook, YXmlText};

/// Walks `parent`'s child list counting only countable, non-deleted
/// units, and returns `(left, right)` such that exactly `offset`
/// visible units precede `right` (or all of them precede `left` if
/// `right` is `None`, i.e. `offset` names the end of the list).
/// Splits the item straddling `offset` if the offset lands mid-item.
pub(crate) fn find_insert_point(
    store: &mut OpStore,
    parent: &Id,
    mut offset: u32,
) -> (Option<Id>, Option<Id>) {
    let mut cur = store
        .get(parent)
        .and_then(|p| p.type_state())
        .and_then(|ts| ts.start.clone());
    let mut left: Option<Id> = None;

    while let Some(id) = cur.clone() {
        let item = store.get(&id).expect("dangling child pointer").clone();
        if item.deleted || !item.countable() {
            cur = item.right.clone();
            continue;
        }
        let len = item.len();
        if offset == 0 {
            return (left, Some(id));
        }
        if offset < len {
            let (l, r) = store.split_raw(&id, offset);
            return (Some(l), Some(r));
        }
        offset -= len;
        left = Some(item.last_id());
        cur = item.right.clone();
    }
    (left, None)
}

/// Total count of visible (countable, non-deleted) units in `parent`'s
/// child list.
pub(crate) fn visible_len(store: &OpStore, parent: &Id) -> u32 {
    let mut cur = store
        .get(parent)
        .and_then(|p| p.type_state())
        .and_then(|ts| ts.start.clone());
    let mut total = 0u32;
    while let Some(id) = cur {
        let item = store.get(&id).expect("dangling child pointer");
        if !item.deleted && item.countable() {
            total += item.len();
        }
        cur = item.right.clone();
    }
    total
}

/// Deletes `len` visible units starting at `index` from `parent`'s
/// child list, splitting boundary items as needed. Returns the ids of
/// every item actually marked deleted. Validates the range up front so
/// a bad call never mutates partial state (§7 InputRange policy).
pub(crate) fn delete_countable_range(
    store: &mut OpStore,
    deletes: &mut crate::delete_store::DeleteStore,
    parent: &Id,
    index: u32,
    len: u32,
) -> Result<Vec<Id>, WeaveError> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let total = visible_len(store, parent);
    if index + len > total {
        return Err(WeaveError::InputRange {
            op: "delete",
            index: (index + len) as usize,
            len: total as usize,
        });
    }

    let mut remaining = len;
    let mut deleted_ids = Vec::new();
    while remaining > 0 {
        let (_, right) = find_insert_point(store, parent, index);
        let id = right.expect("range was validated against visible_len above");
        let item_len = store.get(&id).unwrap().len();
        let take = remaining.min(item_len);
        let target = if take < item_len {
            let (left, _) = store.split_raw(&id, take);
            left
        } else {
            id
        };
        crate::integrate::delete(store, deletes, &target);
        deleted_ids.push(target);
        remaining -= take;
    }
    Ok(deleted_ids)
}

/// Attribute map accumulated from non-deleted format markers between
/// `parent.start` and (but not including) `up_to`.
pub(crate) fn attrs_before(
    store: &OpStore,
    parent: &Id,
    up_to: Option<&Id>,
) -> BTreeMap<String, Value> {
    let mut attrs = BTreeMap::new();
    let mut cur = store
        .get(parent)
        .and_then(|p| p.type_state())
        .and_then(|ts| ts.start.clone());
    while let Some(id) = cur {
        if Some(&id) == up_to {
            break;
        }
        let item = store.get(&id).expect("dangling child pointer");
        if !item.deleted {
            if let Content::Format { key, value } = &item.content {
                if value.is_null() {
                    attrs.remove(key);
                } else {
                    attrs.insert(key.clone(), value.clone());
                }
            }
        }
        cur = item.right.clone();
    }
    attrs
}

/// Renders an array/text child list as a JSON array, recursing into
/// nested type items via their own `to_json`.
pub(crate) fn children_to_json(store: &OpStore, parent: &Id) -> Vec<Value> {
    let mut out = Vec::new();
    let mut cur = store
        .get(parent)
        .and_then(|p| p.type_state())
        .and_then(|ts| ts.start.clone());
    while let Some(id) = cur {
        let item = store.get(&id).expect("dangling child pointer");
        if !item.deleted {
            match &item.content {
                Content::Json(vals) => out.extend(vals.iter().cloned()),
                Content::Str(s) => out.push(Value::String(s.clone())),
                Content::Embed(v) => out.push(v.clone()),
                Content::Type(_) => out.push(to_json_value(store, &id)),
                Content::Format { .. } | Content::Gc { .. } => {}
            }
        }
        cur = item.right.clone();
    }
    out
}

/// Dispatches a type-item's `toJSON()` by its [`crate::content::TypeKind`].
pub fn to_json_value(store: &OpStore, type_id: &Id) -> Value {
    use crate::content::TypeKind;
    let item = store.get(type_id).expect("to_json_value: unknown type id");
    match item.type_kind() {
        Some(TypeKind::Array) | Some(TypeKind::XmlFragment) => {
            Value::Array(children_to_json(store, type_id))
        }
        Some(TypeKind::Text) | Some(TypeKind::XmlText) => {
            Value::String(text::plain_text(store, type_id))
        }
        Some(TypeKind::Map) => {
            let ts = item.type_state().unwrap();
            let mut obj = serde_json::Map::new();
            for key in ts.map.keys() {
                if let Some(v) = map::get_value(store, type_id, key) {
                    obj.insert(key.clone(), v);
                }
            }
            Value::Object(obj)
        }
        Some(TypeKind::XmlElement { node_name }) => {
            let mut obj = serde_json::Map::new();
            obj.insert("nodeName".into(), Value::String(node_name.clone()));
            let ts = item.type_state().unwrap();
            let mut attrs = serde_json::Map::new();
            for key in ts.map.keys() {
                if let Some(v) = map::get_value(store, type_id, key) {
                    attrs.insert(key.clone(), v);
                }
            }
            obj.insert("attributes".into(), Value::Object(attrs));
            obj.insert(
                "children".into(),
                Value::Array(children_to_json(store, type_id)),
            );
            Value::Object(obj)
        }
        Some(TypeKind::XmlHook) => {
            let ts = item.type_state().unwrap();
            let mut obj = serde_json::Map::new();
            for key in ts.map.keys() {
                if let Some(v) = map::get_value(store, type_id, key) {
                    obj.insert(key.clone(), v);
                }
            }
            Value::Object(obj)
        }
        None => Value::Null,
    }
}
