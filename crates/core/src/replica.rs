//! `Replica` (§6 public surface, §10.3 ambient config): the owning
//! object for one document's stores, state vector, and transaction
//! executor.
//!
//! Grounded on the teacher's top-level `Model`/`ModelApi` split
//! (`json_crdt::model::Model` owns the stores and clock, exposes typed
//! constructors for its root nodes): `Replica` plays the same role here
//! — the single-threaded cooperative executor §5 describes, not a
//! reentrant global.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::codec::StructRecord;
use crate::content::{Content, TypeKind};
use crate::delete_store::DeleteStore;
use crate::error::WeaveError;
use crate::id::{Client, Id, StateVector};
use crate::item::Item;
use crate::store::OpStore;
use crate::sync::{self, DependencyQueue, IntegrateOutcome};
use crate::transaction::{Event, Transaction};
use crate::types::{YArray, YMap, YText, YXmlFragment};
use crate::undo::UndoManager;

#[derive(Debug, Clone)]
pub struct ReplicaOptions {
    /// `None` picks a random client id (`rand`), matching the teacher's
    /// default session-id generation instead of requiring callers to
    /// coordinate ids out of band.
    pub client_id: Option<Client>,
    pub gc_enabled: bool,
}

impl Default for ReplicaOptions {
    fn default() -> Self {
        ReplicaOptions {
            client_id: None,
            gc_enabled: true,
        }
    }
}

type Observer = Box<dyn FnMut(&Event)>;
type DeepObserver = Box<dyn FnMut(&[Event])>;

pub struct Replica {
    client: Client,
    state: StateVector,
    store: OpStore,
    deletes: DeleteStore,
    roots: IndexMap<String, u8>,
    gc_enabled: bool,
    sync_queue: DependencyQueue,
    undo_managers: Vec<UndoManager>,
    observers: BTreeMap<Id, Vec<Observer>>,
    deep_observers: BTreeMap<Id, Vec<DeepObserver>>,
}

impl Replica {
    pub fn new(opts: ReplicaOptions) -> Self {
        let client = opts.client_id.unwrap_or_else(|| rand::random::<u32>() % crate::id::ROOT_CLIENT);
        log::debug!("replica created with client id {client}");
        Replica {
            client,
            state: StateVector::new(),
            store: OpStore::new(),
            deletes: DeleteStore::new(),
            roots: IndexMap::new(),
            gc_enabled: opts.gc_enabled,
            sync_queue: DependencyQueue::new(),
            undo_managers: Vec::new(),
            observers: BTreeMap::new(),
            deep_observers: BTreeMap::new(),
        }
    }

    pub fn client_id(&self) -> Client {
        self.client
    }

    pub fn state_vector(&self) -> &StateVector {
        &self.state
    }

    pub fn store(&self) -> &OpStore {
        &self.store
    }

    fn define_root(&mut self, name: &str, kind: TypeKind) -> Result<Id, WeaveError> {
        let tag = kind.struct_tag();
        if let Some(&existing) = self.roots.get(name) {
            if existing != tag {
                return Err(WeaveError::SchemaConflict { name: name.to_string() });
            }
            return Ok(Id::root(name, tag));
        }
        let id = Id::root(name, tag);
        self.store.put(Item::new(id.clone(), None, None, None, None, Content::Type(kind)));
        self.roots.insert(name.to_string(), tag);
        Ok(id)
    }

    pub fn define_array(&mut self, name: &str) -> Result<YArray, WeaveError> {
        Ok(YArray::new(self.define_root(name, TypeKind::Array)?))
    }

    pub fn define_map(&mut self, name: &str) -> Result<YMap, WeaveError> {
        Ok(YMap::new(self.define_root(name, TypeKind::Map)?))
    }

    pub fn define_text(&mut self, name: &str) -> Result<YText, WeaveError> {
        Ok(YText::new(self.define_root(name, TypeKind::Text)?))
    }

    pub fn define_xml_fragment(&mut self, name: &str) -> Result<YXmlFragment, WeaveError> {
        Ok(YXmlFragment { root: self.define_root(name, TypeKind::XmlFragment)? })
    }

    pub fn gc_enabled(&self) -> bool {
        self.gc_enabled
    }

    /// Attaching an undo manager disables garbage collection for the
    /// lifetime of the attachment (§4.7): a collected item has nothing
    /// left to restore.
    pub fn attach_undo_manager(&mut self, manager: UndoManager) -> usize {
        self.gc_enabled = false;
        self.undo_managers.push(manager);
        self.undo_managers.len() - 1
    }

    pub fn undo(&mut self, handle: usize) -> bool {
        let Some(manager) = self.undo_managers.get_mut(handle) else {
            return false;
        };
        let changed = manager.undo(&mut self.store, &mut self.deletes, &mut self.state);
        if changed {
            self.dispatch_all();
        }
        changed
    }

    pub fn redo(&mut self, handle: usize) -> bool {
        let Some(manager) = self.undo_managers.get_mut(handle) else {
            return false;
        };
        let changed = manager.redo(&mut self.store, &mut self.deletes, &mut self.state);
        if changed {
            self.dispatch_all();
        }
        changed
    }

    pub fn observe(&mut self, type_id: Id, callback: Observer) {
        self.observers.entry(type_id).or_default().push(callback);
    }

    pub fn observe_deep(&mut self, type_id: Id, callback: DeepObserver) {
        self.deep_observers.entry(type_id).or_default().push(callback);
    }

    /// Runs `f` against a fresh transaction and fires `afterTransaction`
    /// observers for whatever it touched. Nested `transact` calls are
    /// structurally impossible here: `f` only ever receives `&mut
    /// Transaction`, never `&mut Replica`, so there is no path back into
    /// this method from inside `f` (§5's "nested transact is flattened"
    /// reduces to "cannot be nested" under this API shape).
    pub fn transact<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Transaction) -> R,
    {
        self.transact_inner(f, false)
    }

    pub fn transact_remote<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Transaction) -> R,
    {
        self.transact_inner(f, true)
    }

    fn transact_inner<F, R>(&mut self, f: F, remote: bool) -> R
    where
        F: FnOnce(&mut Transaction) -> R,
    {
        log::debug!("transaction open (remote={remote})");
        let mut tx = Transaction::new(&mut self.store, &mut self.deletes, &mut self.state, self.client, remote);
        let result = f(&mut tx);
        let own_changed = tx.own_changed().clone();
        let bracket = tx.clock_bracket();
        let deleted_structs = tx.deleted_structs().clone();
        let touched: std::collections::BTreeSet<Id> = own_changed.keys().cloned().collect();

        log::debug!(
            "transaction closed: {} types changed, {} new items, {} deleted",
            own_changed.len(),
            tx.new_items().len(),
            deleted_structs.len()
        );

        if !own_changed.is_empty() {
            if !remote {
                for manager in &mut self.undo_managers {
                    manager.record(self.client, bracket, &deleted_structs, &touched);
                }
            }
            self.dispatch(&own_changed);
        }
        if self.gc_enabled && self.undo_managers.is_empty() {
            self.gc_collect(&deleted_structs);
        }
        result
    }

    /// Replaces every deleted item named in `ids` with a gc marker
    /// (§4.7): content and neighbor-adjacent bookkeeping are discarded,
    /// only the covered `(id, length)` range survives, and the delete
    /// store's run for that range is upgraded from tombstone to
    /// collected.
    fn gc_collect(&mut self, ids: &std::collections::BTreeSet<Id>) {
        for id in ids {
            let Some(item) = self.store.get_mut(id) else { continue };
            if item.is_gc() {
                continue;
            }
            let len = item.len();
            item.collect();
            if let (Some(client), Some(clock)) = (id.client(), id.clock()) {
                self.deletes.mark(client, clock, len, true);
            }
        }
    }

    /// Applies structs received over the wire (sync step 2's payload or
    /// an `update` broadcast), parking any with unmet dependencies.
    ///
    /// Bypasses `transact`/`Transaction` for the integration step itself:
    /// `DependencyQueue::integrate`'s `on_applied` callback needs to mark
    /// observer changes for every struct it releases (including ones
    /// chain-unparked deep inside `drain`), which means holding live
    /// mutable borrows of the store, delete store, and own-changed map
    /// all at once — `Transaction` deliberately keeps those behind one
    /// `&mut self` to protect hand-written mutation code, which would
    /// fight the callback here. Observer dispatch still runs exactly as
    /// it would after a local `transact` call, just built from the
    /// callback's bookkeeping instead of from a `Transaction`.
    pub fn apply_remote_structs(&mut self, structs: Vec<StructRecord>) -> Vec<IntegrateOutcome> {
        let mut applied_recs: Vec<StructRecord> = Vec::new();

        let mut outcomes = Vec::with_capacity(structs.len());
        for rec in structs {
            let outcome = self.sync_queue.integrate(
                &mut self.store,
                &mut self.deletes,
                &mut self.state,
                rec,
                |applied| applied_recs.push(applied.clone()),
            );
            outcomes.push(outcome);
        }

        // Resolve each applied struct's owning type only now that
        // integration has finished — for `Item` records the parent is
        // already on the record, but `Delete`/`Gc` only name the target
        // item, whose parent we can look up once it's actually in the
        // store.
        let mut own_changed: BTreeMap<Id, std::collections::BTreeSet<Option<String>>> = BTreeMap::new();
        for rec in &applied_recs {
            if let Some((type_id, key)) = changed_target(&self.store, rec) {
                own_changed.entry(type_id).or_default().insert(key);
            }
        }

        log::debug!(
            "applied {} remote structs, {} types changed",
            outcomes.iter().filter(|o| **o == IntegrateOutcome::Applied).count(),
            own_changed.len()
        );

        // Remote application never feeds the undo manager: §4.10 scopes
        // undo to the local client's own edits, and the reverse-op
        // bracket `record` expects is meaningless for a client whose
        // clock this replica doesn't own.
        if !own_changed.is_empty() {
            self.dispatch(&own_changed);
        }
        outcomes
    }

    /// Applies a decoded delete set directly, without going through
    /// observer dispatch: in sync step 2 the delete set is a redundant
    /// encoding alongside the struct list (every delete already arrives
    /// as a `StructRecord::Delete` through [`Self::apply_remote_structs`],
    /// which does notify observers), kept here only for callers loading
    /// a delete set on its own (e.g. from a persisted snapshot).
    pub fn apply_delete_set(&mut self, entries: Vec<(Client, Vec<crate::delete_store::Run>)>) {
        sync::apply_delete_set(&mut self.store, &mut self.deletes, &entries);
    }

    pub fn missing_structs(&mut self, remote_state: &StateVector) -> Vec<StructRecord> {
        sync::missing_structs(&mut self.store, &self.state, remote_state)
    }

    pub fn local_delete_set(&self) -> Vec<(Client, Vec<crate::delete_store::Run>)> {
        sync::local_delete_set(&self.deletes)
    }

    fn dispatch(&mut self, own_changed: &BTreeMap<Id, std::collections::BTreeSet<Option<String>>>) {
        let mut events = Vec::with_capacity(own_changed.len());
        for (target, keys) in own_changed {
            let event = Event { target: target.clone(), keys: keys.clone() };
            if let Some(callbacks) = self.observers.get_mut(target) {
                for cb in callbacks.iter_mut() {
                    call_observer(cb, &event);
                }
            }
            events.push(event);
        }
        self.bubble_deep(&events);
    }

    fn dispatch_all(&mut self) {
        // Undo/redo can touch an unbounded set of items; re-notify every
        // registered observer with a synthetic "something changed" event
        // for its own target rather than trying to diff exactly which
        // keys moved.
        let targets: Vec<Id> = self.observers.keys().cloned().collect();
        for target in targets {
            let event = Event { target: target.clone(), keys: std::collections::BTreeSet::new() };
            if let Some(callbacks) = self.observers.get_mut(&target) {
                for cb in callbacks.iter_mut() {
                    call_observer(cb, &event);
                }
            }
        }
        let events: Vec<Event> = self
            .deep_observers
            .keys()
            .map(|t| Event { target: t.clone(), keys: std::collections::BTreeSet::new() })
            .collect();
        self.bubble_deep(&events);
    }

    /// Bubbles each event to every ancestor type by walking `parent`
    /// pointers, per §5's `observeDeep` contract.
    fn bubble_deep(&mut self, events: &[Event]) {
        if self.deep_observers.is_empty() {
            return;
        }
        for (ancestor, callbacks) in self.deep_observers.iter_mut() {
            let mut bubbled = Vec::new();
            for event in events {
                let mut cur = Some(event.target.clone());
                while let Some(id) = cur {
                    if &id == ancestor {
                        bubbled.push(event.clone());
                        break;
                    }
                    cur = self.store.get(&id).and_then(|i| i.parent.clone());
                }
            }
            if !bubbled.is_empty() {
                for cb in callbacks.iter_mut() {
                    call_deep_observer(cb, &bubbled);
                }
            }
        }
    }
}

/// Runs a shallow observer, catching a panic the way §9's "exceptions
/// are caught and logged but do not cancel subsequent listeners"
/// contract requires — a misbehaving callback must not poison the
/// transaction that triggered it or the callbacks still queued after it.
fn call_observer(cb: &mut Observer, event: &Event) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(event)));
    if result.is_err() {
        log::warn!("observer callback panicked for target {:?}; ignoring", event.target);
    }
}

fn call_deep_observer(cb: &mut DeepObserver, events: &[Event]) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(events)));
    if result.is_err() {
        log::warn!("deep observer callback panicked; ignoring");
    }
}

/// The `(type_id, key)` an applied struct touched, for observer
/// dispatch. `Item` records carry their parent directly; `Delete`/`Gc`
/// records only name a target item, so its parent is looked up in the
/// store, which by this point holds the now-integrated item.
fn changed_target(store: &OpStore, rec: &StructRecord) -> Option<(Id, Option<String>)> {
    match rec {
        StructRecord::Item(item) => Some((item.parent.clone()?, item.parent_key.clone())),
        StructRecord::Delete { target, .. } => {
            let item = store.get_item(target)?;
            Some((item.parent.clone()?, item.parent_key.clone()))
        }
        StructRecord::Gc { id, .. } => {
            let item = store.get_item(id)?;
            Some((item.parent.clone()?, item.parent_key.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn define_is_idempotent_per_name() {
        let mut replica = Replica::new(ReplicaOptions { client_id: Some(1), ..Default::default() });
        let a1 = replica.define_array("list").unwrap();
        let a2 = replica.define_array("list").unwrap();
        assert_eq!(a1.root, a2.root);
    }

    #[test]
    fn define_conflicting_kind_errors() {
        let mut replica = Replica::new(ReplicaOptions { client_id: Some(1), ..Default::default() });
        replica.define_array("doc").unwrap();
        let err = replica.define_map("doc").unwrap_err();
        assert!(matches!(err, WeaveError::SchemaConflict { .. }));
    }

    #[test]
    fn transact_fires_observer_on_local_change() {
        let mut replica = Replica::new(ReplicaOptions { client_id: Some(1), ..Default::default() });
        let arr = replica.define_array("list").unwrap();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(0));
        let seen2 = seen.clone();
        replica.observe(arr.root.clone(), Box::new(move |_| *seen2.borrow_mut() += 1));
        replica.transact(|tx| arr.insert(tx, 0, vec![Value::from(1)]).unwrap());
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn panicking_observer_does_not_block_later_observers() {
        let mut replica = Replica::new(ReplicaOptions { client_id: Some(1), ..Default::default() });
        let arr = replica.define_array("list").unwrap();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(0));
        let seen2 = seen.clone();
        replica.observe(arr.root.clone(), Box::new(|_| panic!("boom")));
        replica.observe(arr.root.clone(), Box::new(move |_| *seen2.borrow_mut() += 1));
        let prev_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));
        replica.transact(|tx| arr.insert(tx, 0, vec![Value::from(1)]).unwrap());
        std::panic::set_hook(prev_hook);
        assert_eq!(*seen.borrow(), 1);
        assert_eq!(arr.to_json(replica.store()), Value::Array(vec![Value::from(1)]));
    }

    #[test]
    fn undo_after_insert_restores_prior_json() {
        let mut replica = Replica::new(ReplicaOptions { client_id: Some(1), ..Default::default() });
        let text = replica.define_text("t").unwrap();
        let handle = replica.attach_undo_manager(UndoManager::new(vec![text.root.clone()], Default::default()));
        replica.transact(|tx| text.insert(tx, 0, "hello", None).unwrap());
        assert_eq!(text.to_string(replica.store()), "hello");
        assert!(replica.undo(handle));
        assert_eq!(text.to_string(replica.store()), "");
        assert!(replica.redo(handle));
        assert_eq!(text.to_string(replica.store()), "hello");
    }
}
