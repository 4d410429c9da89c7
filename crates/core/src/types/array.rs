//! `YArray` (§4.5 is Maps, but the array operations it specializes are
//! named in §6's public-interface list): an ordered, insertable,
//! deletable sequence of JSON values built directly on the item chain.

use serde_json::Value;

use crate::content::{Content, TypeKind};
use crate::error::WeaveError;
use crate::id::Id;
use crate::item::Item;
use crate::store::OpStore;
use crate::transaction::Transaction;

use super::{children_to_json, delete_countable_range, find_insert_point, visible_len};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YArray {
    pub root: Id,
}

impl YArray {
    pub fn new(root: Id) -> Self {
        YArray { root }
    }

    /// Allocates a fresh array root item directly in the store, without
    /// going through a transaction (used for nested array creation and
    /// by `Replica::define`).
    pub fn allocate_root(store: &mut OpStore, root: Id) -> Self {
        store.put(Item::new(root.clone(), None, None, None, None, Content::Type(TypeKind::Array)));
        YArray { root }
    }

    pub fn len(&self, store: &OpStore) -> u32 {
        visible_len(store, &self.root)
    }

    pub fn is_empty(&self, store: &OpStore) -> bool {
        self.len(store) == 0
    }

    pub fn to_json(&self, store: &OpStore) -> Value {
        Value::Array(children_to_json(store, &self.root))
    }

    pub fn get(&self, store: &OpStore, index: u32) -> Option<Value> {
        children_to_json(store, &self.root).into_iter().nth(index as usize)
    }

    pub fn insert(&self, tx: &mut Transaction, index: u32, values: Vec<Value>) -> Result<(), WeaveError> {
        if values.is_empty() {
            return Ok(());
        }
        let total = visible_len(tx.store(), &self.root);
        if index > total {
            return Err(WeaveError::InputRange {
                op: "insert",
                index: index as usize,
                len: total as usize,
            });
        }
        let len = values.len() as u32;
        let (left, right) = find_insert_point(tx.store_mut(), &self.root, index);
        let id = tx.next_id(len);
        let mut item = Item::new(
            id.clone(),
            left.clone(),
            right.clone(),
            Some(self.root.clone()),
            None,
            Content::Json(values),
        );
        // Pre-seed the left hint so integration scans from the computed
        // insertion point instead of the whole child list (§4.3 step 1).
        item.left = left;
        crate::integrate::integrate(tx.store_mut(), item);
        tx.mark_new(id);
        tx.mark_changed(&self.root, None);
        Ok(())
    }

    pub fn push(&self, tx: &mut Transaction, values: Vec<Value>) -> Result<(), WeaveError> {
        let at = self.len(tx.store());
        self.insert(tx, at, values)
    }

    pub fn delete(&self, tx: &mut Transaction, index: u32, len: u32) -> Result<(), WeaveError> {
        if len == 0 {
            return Ok(());
        }
        let deleted = delete_countable_range(tx.store_mut(), tx.deletes_mut(), &self.root, index, len)?;
        for id in deleted {
            tx.mark_deleted(id);
        }
        tx.mark_changed(&self.root, None);
        Ok(())
    }
}
