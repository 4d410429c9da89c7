//! Synchronization protocol (§4.9, §6): state-vector exchange, missing-
//! struct computation, the out-of-order dependency queue, and the wire
//! envelope for the three message kinds.
//!
//! Role negotiation (`master | slave`, "who re-initiates sync step 1
//! after receiving step 2") is a transport-adapter concern per §1's
//! transport exclusion; this module only builds/parses the messages
//! and applies their payload, the way the teacher's codec modules stop
//! at encode/decode and leave room orchestration to `server-ws`.

use std::collections::BTreeMap;

use crate::codec::varint::{read_var_string, read_var_u32, write_var_string, write_var_u32};
use crate::codec::{decode_delete_set, decode_structs, encode_delete_set, encode_structs, StructRecord};
use crate::delete_store::{DeleteStore, Run};
use crate::error::{DecodeError, WeaveError};
use crate::id::{Client, Clock, Id, StateVector};
use crate::store::OpStore;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrateOutcome {
    Applied,
    AlreadyApplied,
    Parked,
}

pub fn check_protocol_version(remote: u32) -> Result<(), WeaveError> {
    if remote != PROTOCOL_VERSION {
        return Err(WeaveError::ProtocolMismatch {
            local: PROTOCOL_VERSION,
            remote,
        });
    }
    Ok(())
}

/// Computes the struct list the local replica holds that `remote_state`
/// does not yet have, per §4.9's missing-set rule: for each client with
/// a known lower bound, clean-split the prefix item and ship everything
/// up to the local clock. Root items are never emitted — they are
/// reachable by name, not by clock range.
pub fn missing_structs(store: &mut OpStore, local_state: &StateVector, remote_state: &StateVector) -> Vec<StructRecord> {
    let mut out = Vec::new();
    for (client, upper) in local_state.iter() {
        let lower = remote_state.get(client);
        if lower >= upper {
            continue;
        }
        let Some(start_key) = store.get_item_clean_start(&Id::normal(client, lower)) else {
            continue;
        };
        if upper > 0 {
            store.get_item_clean_end(&Id::normal(client, upper - 1));
        }
        let sentinel = Id::normal(client, u32::MAX);
        let keys: Vec<Id> = store
            .iterate(&start_key, &sentinel)
            .take_while(|(k, _)| k.clock().unwrap() < upper)
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            out.push(StructRecord::Item(store.get(&key).unwrap().clone()));
        }
    }
    out
}

pub fn local_delete_set(deletes: &DeleteStore) -> Vec<(Client, Vec<Run>)> {
    deletes
        .clients()
        .map(|c| (c, deletes.runs_for(c).to_vec()))
        .collect()
}

/// Applies a decoded delete set to the local stores (sync step 2 and
/// persisted-state loading both end up here).
pub fn apply_delete_set(store: &mut OpStore, deletes: &mut DeleteStore, entries: &[(Client, Vec<Run>)]) {
    for (client, runs) in entries {
        for run in runs {
            delete_range(store, deletes, &Id::normal(*client, run.clock), run.len);
        }
    }
}

fn delete_range(store: &mut OpStore, deletes: &mut DeleteStore, target: &Id, length: u32) {
    let Some(client) = target.client() else { return };
    let Some(start_clock) = target.clock() else { return };
    let mut clock = start_clock;
    let end = start_clock + length;
    while clock < end {
        let id = Id::normal(client, clock);
        match store.get_item_key(&id) {
            Some(key) => {
                let len = store.get(&key).unwrap().len();
                crate::integrate::delete(store, deletes, &key);
                clock = key.clock().unwrap() + len;
            }
            None => clock += 1,
        }
    }
}

/// Dependency queue for structs whose `origin`/`rightOrigin`/`parent`
/// (or own predecessor clock) hasn't arrived yet (§4.9).
#[derive(Debug, Default)]
pub struct DependencyQueue {
    pending: BTreeMap<(Client, Clock), Vec<StructRecord>>,
}

impl DependencyQueue {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Integrates one decoded struct, parking it if a dependency is
    /// missing. Draining a dependency's arrival may unblock a chain of
    /// previously-parked structs; all of them are applied before this
    /// call returns.
    ///
    /// `on_applied` fires for every struct actually integrated,
    /// including ones released later in this call by draining the
    /// queue — the caller (`Replica`) uses it to mark observer changes
    /// for structs it never saw directly.
    pub fn integrate(
        &mut self,
        store: &mut OpStore,
        deletes: &mut DeleteStore,
        state: &mut StateVector,
        rec: StructRecord,
        mut on_applied: impl FnMut(&StructRecord),
    ) -> IntegrateOutcome {
        let id = rec.id();
        if let (Some(c), Some(k)) = (id.client(), id.clock()) {
            if k < state.get(c) {
                return IntegrateOutcome::AlreadyApplied;
            }
        }
        match missing_dependency(store, state, &rec) {
            Some(dep) => {
                self.pending.entry(dep).or_default().push(rec);
                IntegrateOutcome::Parked
            }
            None => {
                on_applied(&rec);
                apply_struct(store, deletes, state, rec);
                self.drain(store, deletes, state, &mut on_applied);
                IntegrateOutcome::Applied
            }
        }
    }

    fn drain(
        &mut self,
        store: &mut OpStore,
        deletes: &mut DeleteStore,
        state: &mut StateVector,
        on_applied: &mut impl FnMut(&StructRecord),
    ) {
        loop {
            let keys: Vec<(Client, Clock)> = self.pending.keys().cloned().collect();
            let mut progressed = false;
            for key in keys {
                let Some(recs) = self.pending.remove(&key) else {
                    continue;
                };
                for rec in recs {
                    match missing_dependency(store, state, &rec) {
                        Some(dep) => {
                            self.pending.entry(dep).or_default().push(rec);
                        }
                        None => {
                            on_applied(&rec);
                            apply_struct(store, deletes, state, rec);
                            progressed = true;
                        }
                    }
                }
            }
            if !progressed {
                break;
            }
        }
    }
}

fn missing_dependency(store: &OpStore, state: &StateVector, rec: &StructRecord) -> Option<(Client, Clock)> {
    let id = rec.id();
    if let (Some(c), Some(k)) = (id.client(), id.clock()) {
        let have = state.get(c);
        if k > have {
            return Some((c, have));
        }
    }
    for dep in rec.dependencies() {
        if dep.is_root() {
            continue;
        }
        if store.get_item_key(&dep).is_none() {
            return Some((dep.client().unwrap(), dep.clock().unwrap()));
        }
    }
    None
}

fn apply_struct(store: &mut OpStore, deletes: &mut DeleteStore, state: &mut StateVector, rec: StructRecord) {
    match rec {
        StructRecord::Item(mut item) => {
            let id = item.id.clone();
            item.left = None;
            item.right = None;
            crate::integrate::integrate(store, item);
            if let (Some(c), Some(k)) = (id.client(), id.clock()) {
                let len = store.get(&id).map(|i| i.len()).unwrap_or(1);
                state.advance_to(c, k + len);
            }
        }
        StructRecord::Delete { target, length } => {
            delete_range(store, deletes, &target, length);
            if let (Some(c), Some(k)) = (target.client(), target.clock()) {
                state.advance_to(c, k + length);
            }
        }
        StructRecord::Gc { id, length } => {
            if let Some(item) = store.get_mut(&id) {
                item.collect();
            }
            if let (Some(c), Some(k)) = (id.client(), id.clock()) {
                state.advance_to(c, k + length);
            }
        }
    }
}

// --- wire envelopes (§6) ---

pub struct SyncStep1 {
    pub room: String,
    pub auth: String,
    pub protocol_version: u32,
    pub state: StateVector,
}

pub fn encode_sync_step1(room: &str, auth: &str, state: &StateVector) -> Vec<u8> {
    let mut out = Vec::new();
    write_var_string(&mut out, room);
    write_var_string(&mut out, "sync step 1");
    write_var_string(&mut out, auth);
    write_var_u32(&mut out, PROTOCOL_VERSION);
    let entries: Vec<(Client, Clock)> = state.iter().collect();
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (c, k) in entries {
        write_var_u32(&mut out, c);
        write_var_u32(&mut out, k);
    }
    out
}

pub fn decode_sync_step1(buf: &[u8]) -> Result<SyncStep1, DecodeError> {
    let mut pos = 0;
    let room = read_var_string(buf, &mut pos)?;
    let _kind = read_var_string(buf, &mut pos)?;
    let auth = read_var_string(buf, &mut pos)?;
    let protocol_version = read_var_u32(buf, &mut pos)?;
    let n_bytes = buf.get(pos..pos + 4).ok_or(DecodeError::Eof)?;
    let n = u32::from_le_bytes(n_bytes.try_into().unwrap());
    pos += 4;
    let mut state = StateVector::new();
    for _ in 0..n {
        let c = read_var_u32(buf, &mut pos)?;
        let k = read_var_u32(buf, &mut pos)?;
        state.advance_to(c, k);
    }
    Ok(SyncStep1 {
        room,
        auth,
        protocol_version,
        state,
    })
}

pub struct SyncStep2 {
    pub room: String,
    pub auth: String,
    pub structs: Vec<StructRecord>,
    pub delete_set: Vec<(Client, Vec<Run>)>,
}

pub fn encode_sync_step2(room: &str, auth: &str, structs: &[StructRecord], delete_set: &[(Client, Vec<Run>)]) -> Vec<u8> {
    let mut out = Vec::new();
    write_var_string(&mut out, room);
    write_var_string(&mut out, "sync step 2");
    write_var_string(&mut out, auth);
    encode_structs(&mut out, structs);
    encode_delete_set(&mut out, delete_set);
    out
}

pub fn decode_sync_step2(buf: &[u8]) -> Result<SyncStep2, DecodeError> {
    let mut pos = 0;
    let room = read_var_string(buf, &mut pos)?;
    let _kind = read_var_string(buf, &mut pos)?;
    let auth = read_var_string(buf, &mut pos)?;
    let structs = decode_structs(buf, &mut pos)?;
    let delete_set = decode_delete_set(buf, &mut pos)?;
    Ok(SyncStep2 {
        room,
        auth,
        structs,
        delete_set,
    })
}

pub struct UpdateMessage {
    pub room: String,
    pub structs: Vec<StructRecord>,
}

pub fn encode_update(room: &str, structs: &[StructRecord]) -> Vec<u8> {
    let mut out = Vec::new();
    write_var_string(&mut out, room);
    write_var_string(&mut out, "update");
    encode_structs(&mut out, structs);
    out
}

pub fn decode_update(buf: &[u8]) -> Result<UpdateMessage, DecodeError> {
    let mut pos = 0;
    let room = read_var_string(buf, &mut pos)?;
    let _kind = read_var_string(buf, &mut pos)?;
    let structs = decode_structs(buf, &mut pos)?;
    Ok(UpdateMessage { room, structs })
}
