//! The unit of the list CRDT (§3 Item, invariants 1-5).
//!
//! Items live in [`crate::store::OpStore`] keyed by their own `id`;
//! `left`/`right`/`origin`/`right_origin`/`parent` are identifiers
//! resolved back through the store, never borrowed references, per the
//! arena design note in spec §9.

use indexmap::IndexMap;

use crate::content::{Content, TypeKind};
use crate::id::Id;

/// Extra state carried only by items whose content is `Content::Type`:
/// the head of the child list, and the per-key chain heads for
/// map-keyed children.
#[derive(Debug, Clone, Default)]
pub struct TypeState {
    pub start: Option<Id>,
    pub map: IndexMap<String, Id>,
}

#[derive(Debug, Clone)]
pub struct Item {
    pub id: Id,
    pub origin: Option<Id>,
    pub right_origin: Option<Id>,
    pub left: Option<Id>,
    pub right: Option<Id>,
    /// `None` means this item is a top-level type root, owned directly
    /// by the replica. `Some(id)` names the parent type item.
    pub parent: Option<Id>,
    pub parent_key: Option<String>,
    pub deleted: bool,
    /// Set once this item has been undone and then redone: points at
    /// the replacement item created by redo.
    pub redone: Option<Id>,
    pub content: Content,
    pub type_state: Option<TypeState>,
}

impl Item {
    pub fn new(
        id: Id,
        origin: Option<Id>,
        right_origin: Option<Id>,
        parent: Option<Id>,
        parent_key: Option<String>,
        content: Content,
    ) -> Self {
        let type_state = match &content {
            Content::Type(_) => Some(TypeState::default()),
            _ => None,
        };
        Item {
            id,
            origin,
            right_origin,
            left: None,
            right: None,
            parent,
            parent_key,
            deleted: false,
            redone: None,
            content,
            type_state,
        }
    }

    pub fn len(&self) -> u32 {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn countable(&self) -> bool {
        self.content.countable()
    }

    /// The id of this item's last covered position (`id` for
    /// length-1 content).
    pub fn last_id(&self) -> Id {
        self.id.with_offset(self.len().saturating_sub(1))
    }

    pub fn type_kind(&self) -> Option<&TypeKind> {
        match &self.content {
            Content::Type(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn type_state(&self) -> Option<&TypeState> {
        self.type_state.as_ref()
    }

    pub fn type_state_mut(&mut self) -> Option<&mut TypeState> {
        self.type_state.as_mut()
    }

    /// Marks this item as collected: content is discarded, replaced by
    /// a length-preserving `Gc` marker, per §4.7. Idempotent.
    pub fn collect(&mut self) {
        if !matches!(self.content, Content::Gc { .. }) {
            let len = self.len();
            self.content = Content::Gc { len };
            self.type_state = None;
        }
    }

    pub fn is_gc(&self) -> bool {
        matches!(self.content, Content::Gc { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn new_type_item_gets_type_state() {
        let item = Item::new(
            Id::root("doc", 3),
            None,
            None,
            None,
            None,
            Content::Type(TypeKind::Array),
        );
        assert!(item.type_state.is_some());
    }

    #[test]
    fn new_plain_item_has_no_type_state() {
        let item = Item::new(
            Id::normal(1, 0),
            None,
            None,
            Some(Id::root("doc", 3)),
            None,
            Content::Str("hi".into()),
        );
        assert!(item.type_state.is_none());
    }

    #[test]
    fn last_id_accounts_for_length() {
        let item = Item::new(
            Id::normal(1, 10),
            None,
            None,
            None,
            None,
            Content::Str("abc".into()),
        );
        assert_eq!(item.last_id(), Id::normal(1, 12));
    }

    #[test]
    fn collect_discards_content_but_keeps_length() {
        let mut item = Item::new(
            Id::normal(1, 0),
            None,
            None,
            None,
            None,
            Content::Str("hello".into()),
        );
        let len_before = item.len();
        item.collect();
        assert!(item.is_gc());
        assert_eq!(item.len(), len_before);
        item.collect();
        assert_eq!(item.len(), len_before);
    }

    #[test]
    fn embed_content_is_length_one() {
        let item = Item::new(
            Id::normal(1, 0),
            None,
            None,
            None,
            None,
            Content::Embed(Value::Null),
        );
        assert_eq!(item.len(), 1);
    }
}
