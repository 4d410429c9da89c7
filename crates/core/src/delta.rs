//! Delta operations for rich text (§4.6): `insert`/`retain`/`delete`
//! with attribute maps, as consumed and produced by
//! [`crate::types::text::YText::apply_delta`] and `to_delta`.

use std::collections::BTreeMap;

use serde_json::Value;

/// What an `Insert` delta op carries: a run of text or a single embed.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertContent {
    Text(String),
    Embed(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeltaOp {
    Insert {
        content: InsertContent,
        attributes: BTreeMap<String, Value>,
    },
    Retain {
        len: u32,
        attributes: Option<BTreeMap<String, Value>>,
    },
    Delete {
        len: u32,
    },
}

impl DeltaOp {
    pub fn insert_text(text: impl Into<String>, attributes: BTreeMap<String, Value>) -> Self {
        DeltaOp::Insert {
            content: InsertContent::Text(text.into()),
            attributes,
        }
    }

    pub fn insert_embed(value: Value, attributes: BTreeMap<String, Value>) -> Self {
        DeltaOp::Insert {
            content: InsertContent::Embed(value),
            attributes,
        }
    }
}
