//! Transaction batching and change tracking (§4.8).
//!
//! All mutations — local or remote — execute through a `Transaction`
//! borrowed from the owning [`crate::replica::Replica`]; nested
//! `transact` calls are flattened by the replica, never by this type
//! itself (mirrors the teacher's preference for explicit, narrow
//! borrows over a reentrant global).

use std::collections::{BTreeMap, BTreeSet};

use crate::delete_store::DeleteStore;
use crate::id::{Client, Id, StateVector};
use crate::store::OpStore;

/// One observable change: a type whose child list (`key = None`) or a
/// specific map key (`key = Some(..)`) was touched in this transaction.
#[derive(Debug, Clone, Default)]
pub struct Event {
    pub target: Id,
    pub keys: BTreeSet<Option<String>>,
}

/// A single batch of mutations. Borrowed mutably from the replica's
/// stores for the duration of one `Replica::transact` call.
pub struct Transaction<'a> {
    store: &'a mut OpStore,
    deletes: &'a mut DeleteStore,
    state: &'a mut StateVector,
    client: Client,
    pub remote: bool,
    before_state: StateVector,
    new_items: BTreeSet<Id>,
    own_changed: BTreeMap<Id, BTreeSet<Option<String>>>,
    deleted_structs: BTreeSet<Id>,
}

impl<'a> Transaction<'a> {
    pub fn new(
        store: &'a mut OpStore,
        deletes: &'a mut DeleteStore,
        state: &'a mut StateVector,
        client: Client,
        remote: bool,
    ) -> Self {
        let before_state = state.iter().collect();
        Transaction {
            store,
            deletes,
            state,
            client,
            remote,
            before_state,
            new_items: BTreeSet::new(),
            own_changed: BTreeMap::new(),
            deleted_structs: BTreeSet::new(),
        }
    }

    pub fn store(&self) -> &OpStore {
        self.store
    }

    pub fn store_mut(&mut self) -> &mut OpStore {
        self.store
    }

    pub fn deletes_mut(&mut self) -> &mut DeleteStore {
        self.deletes
    }

    /// Direct state-vector access for remote struct application, which
    /// advances other clients' clocks rather than assigning this
    /// transaction's own via [`Self::next_id`].
    pub fn state_mut(&mut self) -> &mut StateVector {
        self.state
    }

    pub fn client(&self) -> Client {
        self.client
    }

    /// Assigns the next `len` clock positions for this transaction's
    /// client, per §4.3's clock-assignment rule.
    pub fn next_id(&mut self, len: u32) -> Id {
        let clock = self.state.get(self.client);
        self.state.advance_to(self.client, clock + len);
        Id::normal(self.client, clock)
    }

    pub fn mark_new(&mut self, id: Id) {
        self.new_items.insert(id);
    }

    pub fn mark_changed(&mut self, type_id: &Id, key: Option<String>) {
        self.own_changed
            .entry(type_id.clone())
            .or_default()
            .insert(key);
    }

    pub fn mark_deleted(&mut self, id: Id) {
        self.deleted_structs.insert(id);
    }

    pub fn before_state(&self) -> &StateVector {
        &self.before_state
    }

    pub fn new_items(&self) -> &BTreeSet<Id> {
        &self.new_items
    }

    pub fn deleted_structs(&self) -> &BTreeSet<Id> {
        &self.deleted_structs
    }

    pub fn own_changed(&self) -> &BTreeMap<Id, BTreeSet<Option<String>>> {
        &self.own_changed
    }

    /// `[fromState, toState]` clock bracket for this transaction's
    /// client, used by the undo manager (§4.10).
    pub fn clock_bracket(&self) -> (u32, u32) {
        let from = self.before_state.get(self.client);
        let to = self.state.get(self.client);
        (from, to)
    }
}
