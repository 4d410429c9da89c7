//! Struct-tag dispatch table and item/message wire encoding (§4.12, §6).
//!
//! Grounded on the teacher's `json_crdt_patch::operations::Op` — an
//! exhaustive tagged-variant enum with a `Display` impl that branches
//! per variant, and `patch.rs`'s `rewrite_op`, an exhaustive match over
//! every variant for in-place rewriting. Both are the shape for the
//! "immutable dispatch table instead of global registry" design note in
//! spec §9: here the table is simply this module's `encode`/`decode`
//! functions plus the `TAG_*` constants, passed around as plain code
//! rather than a runtime-registered object.

pub mod varint;

use serde_json::Value;

use crate::content::{Content, TypeKind};
use crate::delete_store::Run;
use crate::error::DecodeError;
use crate::id::{Client, Clock, Id};
use crate::item::Item;
use varint::*;

pub const TAG_ITEM_JSON: u8 = 0;
pub const TAG_ITEM_STRING: u8 = 1;
pub const TAG_DELETE: u8 = 2;
pub const TAG_YARRAY: u8 = 3;
pub const TAG_YMAP: u8 = 4;
pub const TAG_YTEXT: u8 = 5;
pub const TAG_YXML_FRAGMENT: u8 = 6;
pub const TAG_YXML_ELEMENT: u8 = 7;
pub const TAG_YXML_TEXT: u8 = 8;
pub const TAG_YXML_HOOK: u8 = 9;
pub const TAG_ITEM_FORMAT: u8 = 10;
pub const TAG_ITEM_EMBED: u8 = 11;
pub const TAG_GC: u8 = 12;

const ROOT_CLIENT_SENTINEL: u32 = crate::id::ROOT_CLIENT;

const INFO_HAS_ORIGIN: u8 = 0x1;
const INFO_HAS_RIGHT_ORIGIN: u8 = 0x4;
const INFO_HAS_PARENT_KEY: u8 = 0x8;
const INFO_ORIGIN_MASK: u8 = INFO_HAS_ORIGIN | INFO_HAS_RIGHT_ORIGIN;

/// A struct exactly as it appears on the wire, before integration.
#[derive(Debug, Clone)]
pub enum StructRecord {
    Item(Item),
    Delete { target: Id, length: u32 },
    Gc { id: Id, length: u32 },
}

impl StructRecord {
    /// The ids this struct depends on having already been integrated
    /// (§4.9): its own predecessor clock range, plus `origin`,
    /// `right_origin`, and `parent` for item structs.
    pub fn dependencies(&self) -> Vec<Id> {
        match self {
            StructRecord::Item(item) => {
                let mut deps = Vec::new();
                if let Some(o) = &item.origin {
                    deps.push(o.clone());
                }
                if let Some(o) = &item.right_origin {
                    deps.push(o.clone());
                }
                if let Some(p) = &item.parent {
                    deps.push(p.clone());
                }
                deps
            }
            StructRecord::Delete { target, .. } => vec![target.clone()],
            StructRecord::Gc { .. } => Vec::new(),
        }
    }

    pub fn id(&self) -> Id {
        match self {
            StructRecord::Item(item) => item.id.clone(),
            StructRecord::Delete { target, .. } => target.clone(),
            StructRecord::Gc { id, .. } => id.clone(),
        }
    }

    pub fn len(&self) -> u32 {
        match self {
            StructRecord::Item(item) => item.len(),
            StructRecord::Delete { length, .. } => *length,
            StructRecord::Gc { length, .. } => *length,
        }
    }
}

pub fn encode_id(out: &mut Vec<u8>, id: &Id) {
    match id {
        Id::Normal { client, clock } => {
            write_var_u32(out, *client);
            write_var_u32(out, *clock);
        }
        Id::Root { name, type_tag } => {
            write_var_u32(out, ROOT_CLIENT_SENTINEL);
            write_var_string(out, name);
            write_var_u32(out, *type_tag as u32);
        }
    }
}

pub fn decode_id(buf: &[u8], pos: &mut usize) -> Result<Id, DecodeError> {
    let client = read_var_u32(buf, pos)?;
    if client == ROOT_CLIENT_SENTINEL {
        let name = read_var_string(buf, pos)?;
        let type_tag = read_var_u32(buf, pos)? as u8;
        Ok(Id::Root { name, type_tag })
    } else {
        let clock = read_var_u32(buf, pos)?;
        Ok(Id::Normal { client, clock })
    }
}

fn encode_json_value(out: &mut Vec<u8>, v: &Value) {
    write_var_string(out, &v.to_string());
}

fn decode_json_value(buf: &[u8], pos: &mut usize) -> Result<Value, DecodeError> {
    let s = read_var_string(buf, pos)?;
    serde_json::from_str(&s).map_err(|e| DecodeError::Json(e.to_string()))
}

pub fn encode_struct(out: &mut Vec<u8>, rec: &StructRecord) {
    match rec {
        StructRecord::Delete { target, length } => {
            write_u8(out, TAG_DELETE);
            encode_id(out, target);
            write_var_u32(out, *length);
        }
        StructRecord::Gc { id, length } => {
            write_u8(out, TAG_GC);
            encode_id(out, id);
            write_var_u32(out, *length);
        }
        StructRecord::Item(item) => {
            write_u8(out, item.content.struct_tag());
            encode_item_body(out, item);
        }
    }
}

fn encode_item_body(out: &mut Vec<u8>, item: &Item) {
    let has_origin = item.origin.is_some();
    let has_right_origin = item.right_origin.is_some();
    let has_parent_key = item.parent_key.is_some();
    let mut info = 0u8;
    if has_origin {
        info |= INFO_HAS_ORIGIN;
    }
    if has_right_origin {
        info |= INFO_HAS_RIGHT_ORIGIN;
    }
    if has_parent_key {
        info |= INFO_HAS_PARENT_KEY;
    }
    write_u8(out, info);
    encode_id(out, &item.id);
    if let Some(o) = &item.origin {
        encode_id(out, o);
    }
    if let Some(o) = &item.right_origin {
        encode_id(out, o);
    }
    if info & INFO_ORIGIN_MASK == 0 {
        encode_id(
            out,
            item.parent
                .as_ref()
                .expect("non-root item must carry a parent when origin and right-origin are both absent"),
        );
    }
    if let Some(key) = &item.parent_key {
        write_var_string(out, key);
    }

    match &item.content {
        Content::Json(vals) => {
            write_var_u32(out, vals.len() as u32);
            for v in vals {
                encode_json_value(out, v);
            }
        }
        Content::Str(s) => write_var_string(out, s),
        Content::Format { key, value } => {
            write_var_string(out, key);
            encode_json_value(out, value);
        }
        Content::Embed(v) => encode_json_value(out, v),
        Content::Type(TypeKind::XmlElement { node_name }) => write_var_string(out, node_name),
        Content::Type(TypeKind::XmlText) => {}
        Content::Type(_) => {}
        Content::Gc { .. } => unreachable!("gc is encoded as its own StructRecord variant"),
    }
}

pub fn decode_struct(buf: &[u8], pos: &mut usize) -> Result<StructRecord, DecodeError> {
    let tag = read_u8(buf, pos)?;
    match tag {
        TAG_DELETE => {
            let target = decode_id(buf, pos)?;
            let length = read_var_u32(buf, pos)?;
            Ok(StructRecord::Delete { target, length })
        }
        TAG_GC => {
            let id = decode_id(buf, pos)?;
            let length = read_var_u32(buf, pos)?;
            Ok(StructRecord::Gc { id, length })
        }
        _ => {
            let item = decode_item_body(buf, pos, tag)?;
            Ok(StructRecord::Item(item))
        }
    }
}

fn decode_item_body(buf: &[u8], pos: &mut usize, tag: u8) -> Result<Item, DecodeError> {
    let info = read_u8(buf, pos)?;
    let id = decode_id(buf, pos)?;
    let origin = if info & INFO_HAS_ORIGIN != 0 {
        Some(decode_id(buf, pos)?)
    } else {
        None
    };
    let right_origin = if info & INFO_HAS_RIGHT_ORIGIN != 0 {
        Some(decode_id(buf, pos)?)
    } else {
        None
    };
    let parent = if info & INFO_ORIGIN_MASK == 0 {
        Some(decode_id(buf, pos)?)
    } else {
        None
    };
    let parent_key = if info & INFO_HAS_PARENT_KEY != 0 {
        Some(read_var_string(buf, pos)?)
    } else {
        None
    };

    let content = match tag {
        TAG_ITEM_JSON => {
            let n = read_var_u32(buf, pos)?;
            let mut vals = Vec::with_capacity(n as usize);
            for _ in 0..n {
                vals.push(decode_json_value(buf, pos)?);
            }
            Content::Json(vals)
        }
        TAG_ITEM_STRING => Content::Str(read_var_string(buf, pos)?),
        TAG_ITEM_FORMAT => {
            let key = read_var_string(buf, pos)?;
            let value = decode_json_value(buf, pos)?;
            Content::Format { key, value }
        }
        TAG_ITEM_EMBED => Content::Embed(decode_json_value(buf, pos)?),
        TAG_YARRAY => Content::Type(TypeKind::Array),
        TAG_YMAP => Content::Type(TypeKind::Map),
        TAG_YTEXT => Content::Type(TypeKind::Text),
        TAG_YXML_FRAGMENT => Content::Type(TypeKind::XmlFragment),
        TAG_YXML_HOOK => Content::Type(TypeKind::XmlHook),
        TAG_YXML_TEXT => Content::Type(TypeKind::XmlText),
        TAG_YXML_ELEMENT => {
            let node_name = read_var_string(buf, pos)?;
            Content::Type(TypeKind::XmlElement { node_name })
        }
        other => return Err(DecodeError::UnknownTag(other)),
    };

    Ok(Item::new(id, origin, right_origin, parent, parent_key, content))
}

/// `STRUCTS = u32 n | n x (u8 tag, body)`. Unlike the var-uint fields
/// used elsewhere, the outer count is a fixed 4-byte little-endian
/// `u32`, per §6.
pub fn encode_structs(out: &mut Vec<u8>, recs: &[StructRecord]) {
    out.extend_from_slice(&(recs.len() as u32).to_le_bytes());
    for rec in recs {
        encode_struct(out, rec);
    }
}

pub fn decode_structs(buf: &[u8], pos: &mut usize) -> Result<Vec<StructRecord>, DecodeError> {
    let n_bytes = buf.get(*pos..*pos + 4).ok_or(DecodeError::Eof)?;
    let n = u32::from_le_bytes(n_bytes.try_into().unwrap());
    *pos += 4;
    let mut out = Vec::with_capacity(n as usize);
    for _ in 0..n {
        out.push(decode_struct(buf, pos)?);
    }
    Ok(out)
}

/// `DELETESET = u32 users | users x (varUint client, u32 m, m x (varUint clock, varUint length, u8 gcFlag))`.
pub fn encode_delete_set(out: &mut Vec<u8>, entries: &[(Client, Vec<Run>)]) {
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (client, runs) in entries {
        write_var_u32(out, *client);
        out.extend_from_slice(&(runs.len() as u32).to_le_bytes());
        for run in runs {
            write_var_u32(out, run.clock);
            write_var_u32(out, run.len);
            write_u8(out, run.gc as u8);
        }
    }
}

pub fn decode_delete_set(
    buf: &[u8],
    pos: &mut usize,
) -> Result<Vec<(Client, Vec<Run>)>, DecodeError> {
    let users_bytes = buf.get(*pos..*pos + 4).ok_or(DecodeError::Eof)?;
    let users = u32::from_le_bytes(users_bytes.try_into().unwrap());
    *pos += 4;
    let mut out = Vec::with_capacity(users as usize);
    for _ in 0..users {
        let client = read_var_u32(buf, pos)?;
        let m_bytes = buf.get(*pos..*pos + 4).ok_or(DecodeError::Eof)?;
        let m = u32::from_le_bytes(m_bytes.try_into().unwrap());
        *pos += 4;
        let mut runs = Vec::with_capacity(m as usize);
        for _ in 0..m {
            let clock = read_var_u32(buf, pos)?;
            let len = read_var_u32(buf, pos)?;
            let gc = read_u8(buf, pos)? != 0;
            runs.push(Run { clock, len, gc });
        }
        out.push((client, runs));
    }
    Ok(out)
}

pub type Clocks = (Client, Clock);
