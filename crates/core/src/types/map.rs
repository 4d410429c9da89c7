//! `YMap` (§4.5): last-writer-visible, concurrent-writer-retained
//! keyed values. Each key owns its own conflict chain headed by
//! `TypeState::map[key]`; concurrent writers resolve via the same
//! §4.3 integration rule used for list positions, with `origin = null`
//! and `rightOrigin = ` the previous head.

use serde_json::Value;

use crate::content::{Content, TypeKind};
use crate::error::WeaveError;
use crate::id::Id;
use crate::item::Item;
use crate::store::OpStore;
use crate::transaction::Transaction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YMap {
    pub root: Id,
}

impl YMap {
    pub fn new(root: Id) -> Self {
        YMap { root }
    }

    pub fn allocate_root(store: &mut OpStore, root: Id) -> Self {
        store.put(Item::new(root.clone(), None, None, None, None, Content::Type(TypeKind::Map)));
        YMap { root }
    }

    pub fn get(&self, store: &OpStore, key: &str) -> Option<Value> {
        get_value(store, &self.root, key)
    }

    pub fn has(&self, store: &OpStore, key: &str) -> bool {
        self.get(store, key).is_some()
    }

    pub fn keys(&self, store: &OpStore) -> Vec<String> {
        store
            .get(&self.root)
            .and_then(|i| i.type_state())
            .map(|ts| ts.map.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn to_json(&self, store: &OpStore) -> Value {
        let mut obj = serde_json::Map::new();
        for key in self.keys(store) {
            if let Some(v) = self.get(store, &key) {
                obj.insert(key, v);
            }
        }
        Value::Object(obj)
    }

    pub fn set(&self, tx: &mut Transaction, key: impl Into<String>, value: Value) -> Result<(), WeaveError> {
        let key = key.into();
        let prev_head = tx
            .store()
            .get(&self.root)
            .and_then(|i| i.type_state())
            .and_then(|ts| ts.map.get(&key).cloned());
        let id = tx.next_id(1);
        let item = Item::new(
            id.clone(),
            None,
            prev_head,
            Some(self.root.clone()),
            Some(key.clone()),
            Content::Json(vec![value]),
        );
        crate::integrate::integrate(tx.store_mut(), item);
        tx.mark_new(id);
        tx.mark_changed(&self.root, Some(key));
        Ok(())
    }

    pub fn delete(&self, tx: &mut Transaction, key: &str) -> Result<(), WeaveError> {
        let Some(head) = tx
            .store()
            .get(&self.root)
            .and_then(|i| i.type_state())
            .and_then(|ts| ts.map.get(key).cloned())
        else {
            return Ok(());
        };
        if crate::integrate::delete(tx.store_mut(), tx.deletes_mut(), &head) {
            tx.mark_deleted(head);
            tx.mark_changed(&self.root, Some(key.to_string()));
        }
        Ok(())
    }
}

/// Walks a key's chain from its head to the first non-deleted item —
/// the "visible" value per §3 invariant 3.
pub(crate) fn get_value(store: &OpStore, root: &Id, key: &str) -> Option<Value> {
    let head = store
        .get(root)
        .and_then(|i| i.type_state())
        .and_then(|ts| ts.map.get(key).cloned())?;
    let mut cur = Some(head);
    while let Some(id) = cur {
        let item = store.get(&id)?;
        if !item.deleted {
            return match &item.content {
                Content::Json(vals) => vals.first().cloned(),
                Content::Embed(v) => Some(v.clone()),
                _ => None,
            };
        }
        cur = item.right.clone();
    }
    None
}
