//! Item content variants (§3, §4.6) and the type-subtree kinds that a
//! `Type`-content item can be.
//!
//! Generalizes the teacher's `CrdtNode` tagged-variant dispatch
//! (`json_crdt::nodes::CrdtNode`: Con/Val/Obj/Vec/Str/Bin/Arr) to the
//! content variants this engine's item model actually needs.

use serde_json::Value;

/// The kind of child-list owning type a `Content::Type` item represents.
/// Carries the wire-format tag (§4.12) and, for XML element/text nodes,
/// the node name (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Array,
    Map,
    Text,
    XmlFragment,
    XmlElement { node_name: String },
    XmlHook,
    XmlText,
}

impl TypeKind {
    pub fn struct_tag(&self) -> u8 {
        match self {
            TypeKind::Array => crate::codec::TAG_YARRAY,
            TypeKind::Map => crate::codec::TAG_YMAP,
            TypeKind::Text => crate::codec::TAG_YTEXT,
            TypeKind::XmlFragment => crate::codec::TAG_YXML_FRAGMENT,
            TypeKind::XmlElement { .. } => crate::codec::TAG_YXML_ELEMENT,
            TypeKind::XmlHook => crate::codec::TAG_YXML_HOOK,
            TypeKind::XmlText => crate::codec::TAG_YXML_TEXT,
        }
    }
}

/// The payload of an item, per §3: "json-array, utf16-string,
/// embed-object, format-marker(key,value), subtype, gc".
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// A batch of JSON values inserted as one item (`YArray::insert`
    /// with more than one value creates one item covering all of them).
    Json(Vec<Value>),
    /// A run of UTF-16 code units stored as a UTF-8 `String`; length is
    /// the UTF-16 code-unit count, not the byte count.
    Str(String),
    /// A single opaque embedded object (e.g. an image placeholder in
    /// rich text).
    Embed(Value),
    /// A rich-text format marker; does not advance visible indices.
    Format { key: String, value: Value },
    /// This item is itself a nested type (array/map/text/xml-*) root.
    Type(TypeKind),
    /// A tombstone whose original content has been discarded by
    /// garbage collection (§4.7); only the covered length survives.
    Gc { len: u32 },
}

impl Content {
    /// Number of positions this content occupies. 1 for everything
    /// except JSON batches (one per value) and collected GC runs.
    pub fn len(&self) -> u32 {
        match self {
            Content::Json(vals) => vals.len() as u32,
            Content::Str(s) => s.encode_utf16().count() as u32,
            Content::Embed(_) => 1,
            Content::Format { .. } => 1,
            Content::Type(_) => 1,
            Content::Gc { len } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Format markers do not advance user-visible indices.
    pub fn countable(&self) -> bool {
        !matches!(self, Content::Format { .. })
    }

    pub fn struct_tag(&self) -> u8 {
        match self {
            Content::Json(_) => crate::codec::TAG_ITEM_JSON,
            Content::Str(_) => crate::codec::TAG_ITEM_STRING,
            Content::Embed(_) => crate::codec::TAG_ITEM_EMBED,
            Content::Format { .. } => crate::codec::TAG_ITEM_FORMAT,
            Content::Type(kind) => kind.struct_tag(),
            Content::Gc { .. } => crate::codec::TAG_GC,
        }
    }

    /// Splits this content at code-unit/element offset `d` (0 < d <
    /// len), returning `(left, right)`. Panics if `d` is out of range
    /// or the content is not splittable (types, embeds, and format
    /// markers always have length 1 and are never split).
    pub fn split_at(&self, d: u32) -> (Content, Content) {
        match self {
            Content::Json(vals) => {
                let idx = d as usize;
                let (l, r) = vals.split_at(idx);
                (Content::Json(l.to_vec()), Content::Json(r.to_vec()))
            }
            Content::Str(s) => {
                let units: Vec<u16> = s.encode_utf16().collect();
                let idx = d as usize;
                let left = String::from_utf16_lossy(&units[..idx]);
                let right = String::from_utf16_lossy(&units[idx..]);
                (Content::Str(left), Content::Str(right))
            }
            Content::Gc { len } => (Content::Gc { len: d }, Content::Gc { len: len - d }),
            other => panic!("content variant {other:?} cannot be split"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_length_counts_utf16_units() {
        let c = Content::Str("a\u{1F600}b".to_string());
        assert_eq!(c.len(), 4); // 'a' + surrogate pair + 'b'
    }

    #[test]
    fn format_is_not_countable() {
        let c = Content::Format {
            key: "bold".into(),
            value: Value::Bool(true),
        };
        assert!(!c.countable());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn json_batch_length_is_value_count() {
        let c = Content::Json(vec![Value::from(1), Value::from(2), Value::from(3)]);
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn split_str_respects_utf16_offsets() {
        let c = Content::Str("hello".to_string());
        let (l, r) = c.split_at(2);
        assert_eq!(l, Content::Str("he".to_string()));
        assert_eq!(r, Content::Str("llo".to_string()));
    }

    #[test]
    fn split_json_batch() {
        let c = Content::Json(vec![Value::from(1), Value::from(2), Value::from(3)]);
        let (l, r) = c.split_at(1);
        assert_eq!(l, Content::Json(vec![Value::from(1)]));
        assert_eq!(r, Content::Json(vec![Value::from(2), Value::from(3)]));
    }

    #[test]
    #[should_panic]
    fn split_embed_panics() {
        Content::Embed(Value::Null).split_at(0);
    }
}
