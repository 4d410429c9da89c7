//! Ordered operation store (§4.1): a sorted map from `Id` to [`Item`]
//! supporting range iteration and clean-split queries.
//!
//! spec.md §1 explicitly treats the backing ordered-map primitive as an
//! out-of-scope external collaborator ("any ordered associative
//! container with range iteration and in-place neighbor lookup
//! suffices"). The teacher's analogous primitive, `sonic-forest`'s
//! `SortedMap`, turned out to have most of its lookup API stubbed out
//! with `panic!("Method not implemented.")`, so this store is built
//! directly on `std::collections::BTreeMap` instead (see DESIGN.md).

use std::collections::BTreeMap;

use crate::id::Id;
use crate::item::Item;

#[derive(Debug, Default)]
pub struct OpStore {
    items: BTreeMap<Id, Item>,
}

impl OpStore {
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }

    /// Inserts keyed by `item.id`, overwriting any item at an equal key
    /// (used for idempotent root allocation).
    pub fn put(&mut self, item: Item) {
        self.items.insert(item.id.clone(), item);
    }

    pub fn get(&self, id: &Id) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &Id) -> Option<&mut Item> {
        self.items.get_mut(id)
    }

    pub fn contains_key(&self, id: &Id) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find_prev(&self, id: &Id) -> Option<(&Id, &Item)> {
        self.items.range(..id.clone()).next_back()
    }

    pub fn find_next(&self, id: &Id) -> Option<(&Id, &Item)> {
        self.items.range(id.clone()..).find(|(k, _)| *k != id)
    }

    /// Largest key `<= id`.
    pub fn find_with_upper_bound(&self, id: &Id) -> Option<(&Id, &Item)> {
        self.items.range(..=id.clone()).next_back()
    }

    /// Smallest key `>= id`.
    pub fn find_with_lower_bound(&self, id: &Id) -> Option<(&Id, &Item)> {
        self.items.range(id.clone()..).next()
    }

    pub fn iterate(&self, from: &Id, to: &Id) -> impl Iterator<Item = (&Id, &Item)> {
        self.items.range(from.clone()..=to.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Id, &Item)> {
        self.items.iter()
    }

    /// Finds the key of the item whose `[clock, clock+len)` range
    /// covers `id`. For root ids this is just an exact-key lookup since
    /// roots are always length 1.
    pub fn get_item_key(&self, id: &Id) -> Option<Id> {
        match id {
            Id::Root { .. } => self.items.contains_key(id).then(|| id.clone()),
            Id::Normal { client, clock } => {
                let (key, item) = self.find_with_upper_bound(id)?;
                match key {
                    Id::Normal {
                        client: kc,
                        clock: kk,
                    } if kc == client && *kk <= *clock && *clock < kk + item.len() => {
                        Some(key.clone())
                    }
                    _ => None,
                }
            }
        }
    }

    pub fn get_item(&self, id: &Id) -> Option<&Item> {
        let key = self.get_item_key(id)?;
        self.items.get(&key)
    }

    /// Splits the item at `key` in two at offset `d` (0 < d < len),
    /// returning `(left_id, right_id)` (left_id == key, unchanged).
    /// Rewires the immediate left/right pointers so the new right piece
    /// takes over the old item's right neighbor; does **not** rewrite
    /// any other item's `origin` pointer — that transitive rewrite is
    /// `integrate::split_at`'s job, since it is a list-CRDT concern, not
    /// a storage concern.
    pub fn split_raw(&mut self, key: &Id, d: u32) -> (Id, Id) {
        let item = self.items.get(key).expect("split_raw: no such item");
        assert!(d > 0 && d < item.len(), "split offset out of range");
        let (left_content, right_content) = item.content.split_at(d);
        let right_id = key.with_offset(d);
        let mut right_item = item.clone();
        right_item.id = right_id.clone();
        right_item.content = right_content;
        right_item.origin = Some(key.with_offset(d - 1));
        right_item.left = Some(key.with_offset(d - 1));
        // right_item.right / right_origin inherited from the old item's right side

        let old_right = item.right.clone();

        let left_item = self.items.get_mut(key).unwrap();
        left_item.content = left_content;
        left_item.right = Some(right_id.clone());

        if let Some(old_right_id) = &old_right {
            if let Some(neighbor) = self.items.get_mut(old_right_id) {
                neighbor.left = Some(right_id.clone());
            }
        }

        self.items.insert(right_id.clone(), right_item);
        (key.clone(), right_id)
    }

    /// Returns the key of the item such that `id` is its first
    /// position, splitting the containing item if `id` lands mid-item.
    pub fn get_item_clean_start(&mut self, id: &Id) -> Option<Id> {
        let key = self.get_item_key(id)?;
        match (&key, id) {
            (Id::Normal { clock: kk, .. }, Id::Normal { clock, .. }) if kk < clock => {
                let d = clock - kk;
                let (_, right) = self.split_raw(&key, d);
                Some(right)
            }
            _ => Some(key),
        }
    }

    /// Returns the key of the item such that `id` is its last
    /// position, splitting the containing item if needed.
    pub fn get_item_clean_end(&mut self, id: &Id) -> Option<Id> {
        let key = self.get_item_key(id)?;
        let item = self.items.get(&key)?;
        match (&key, id) {
            (Id::Normal { clock: kk, .. }, Id::Normal { clock, .. }) => {
                let last = kk + item.len() - 1;
                if clock < &last {
                    let d = clock - kk + 1;
                    let (left, _) = self.split_raw(&key, d);
                    Some(left)
                } else {
                    Some(key)
                }
            }
            _ => Some(key),
        }
    }
}
