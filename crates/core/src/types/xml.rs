//! XML tree types (§3, §6 wire tags `YXmlFragment`/`YXmlElement`/
//! `YXmlText`/`YXmlHook`): node containers built on the same child-list
//! primitives as [`super::array::YArray`]. A child node is itself an
//! item whose content is `Content::Type(..)` — it plays double duty as
//! a position in its parent's child list *and* a container with its
//! own `type_state`, exactly like a nested array/map. `YXmlText` is a
//! thin alias over [`super::text::YText`]; formatting works identically
//! inside an XML text node. Attributes reuse the per-key chain-head
//! lookup [`super::map`] already implements for `YMap`.

use serde_json::Value;

use crate::content::{Content, TypeKind};
use crate::error::WeaveError;
use crate::id::Id;
use crate::item::Item;
use crate::store::OpStore;
use crate::transaction::Transaction;

use super::map::get_value;
use super::{children_to_json, delete_countable_range, find_insert_point, visible_len};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YXmlFragment {
    pub root: Id,
}

impl YXmlFragment {
    pub fn allocate_root(store: &mut OpStore, root: Id) -> Self {
        store.put(Item::new(root.clone(), None, None, None, None, Content::Type(TypeKind::XmlFragment)));
        YXmlFragment { root }
    }

    pub fn len(&self, store: &OpStore) -> u32 {
        visible_len(store, &self.root)
    }

    pub fn to_json(&self, store: &OpStore) -> Value {
        Value::Array(children_to_json(store, &self.root))
    }

    fn insert_node(&self, tx: &mut Transaction, index: u32, content: Content) -> Result<Id, WeaveError> {
        let total = visible_len(tx.store(), &self.root);
        if index > total {
            return Err(WeaveError::InputRange { op: "xml-insert", index: index as usize, len: total as usize });
        }
        let (left, right) = find_insert_point(tx.store_mut(), &self.root, index);
        let id = tx.next_id(1);
        let mut item = Item::new(id.clone(), left.clone(), right, Some(self.root.clone()), None, content);
        item.left = left;
        crate::integrate::integrate(tx.store_mut(), item);
        tx.mark_new(id.clone());
        tx.mark_changed(&self.root, None);
        Ok(id)
    }

    pub fn insert_element(
        &self,
        tx: &mut Transaction,
        index: u32,
        node_name: impl Into<String>,
    ) -> Result<YXmlElement, WeaveError> {
        let id = self.insert_node(tx, index, Content::Type(TypeKind::XmlElement { node_name: node_name.into() }))?;
        Ok(YXmlElement { root: id })
    }

    pub fn insert_text(&self, tx: &mut Transaction, index: u32) -> Result<YXmlText, WeaveError> {
        let id = self.insert_node(tx, index, Content::Type(TypeKind::XmlText))?;
        Ok(YXmlText::new(id))
    }

    pub fn insert_hook(&self, tx: &mut Transaction, index: u32) -> Result<YXmlHook, WeaveError> {
        let id = self.insert_node(tx, index, Content::Type(TypeKind::XmlHook))?;
        Ok(YXmlHook { root: id })
    }

    pub fn delete(&self, tx: &mut Transaction, index: u32, len: u32) -> Result<(), WeaveError> {
        let deleted = delete_countable_range(tx.store_mut(), tx.deletes_mut(), &self.root, index, len)?;
        for id in deleted {
            tx.mark_deleted(id);
        }
        tx.mark_changed(&self.root, None);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YXmlElement {
    pub root: Id,
}

impl YXmlElement {
    pub fn node_name(&self, store: &OpStore) -> String {
        match store.get(&self.root).and_then(|i| i.type_kind()) {
            Some(TypeKind::XmlElement { node_name }) => node_name.clone(),
            _ => String::new(),
        }
    }

    pub fn set_attribute(&self, tx: &mut Transaction, key: impl Into<String>, value: Value) -> Result<(), WeaveError> {
        let key = key.into();
        let prev_head = tx
            .store()
            .get(&self.root)
            .and_then(|i| i.type_state())
            .and_then(|ts| ts.map.get(&key).cloned());
        let id = tx.next_id(1);
        let item = Item::new(id.clone(), None, prev_head, Some(self.root.clone()), Some(key.clone()), Content::Json(vec![value]));
        crate::integrate::integrate(tx.store_mut(), item);
        tx.mark_new(id);
        tx.mark_changed(&self.root, Some(key));
        Ok(())
    }

    pub fn get_attribute(&self, store: &OpStore, key: &str) -> Option<Value> {
        get_value(store, &self.root, key)
    }

    pub fn children(&self) -> YXmlFragment {
        YXmlFragment { root: self.root.clone() }
    }

    pub fn to_json(&self, store: &OpStore) -> Value {
        crate::types::to_json_value(store, &self.root)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YXmlHook {
    pub root: Id,
}

impl YXmlHook {
    pub fn set(&self, tx: &mut Transaction, key: impl Into<String>, value: Value) -> Result<(), WeaveError> {
        let key = key.into();
        let prev_head = tx
            .store()
            .get(&self.root)
            .and_then(|i| i.type_state())
            .and_then(|ts| ts.map.get(&key).cloned());
        let id = tx.next_id(1);
        let item = Item::new(id.clone(), None, prev_head, Some(self.root.clone()), Some(key.clone()), Content::Json(vec![value]));
        crate::integrate::integrate(tx.store_mut(), item);
        tx.mark_new(id);
        tx.mark_changed(&self.root, Some(key));
        Ok(())
    }

    pub fn get(&self, store: &OpStore, key: &str) -> Option<Value> {
        get_value(store, &self.root, key)
    }
}

/// Thin alias: an XML text node formats and reads exactly like
/// [`super::text::YText`], only the wire struct tag differs.
pub type YXmlText = super::text::YText;
