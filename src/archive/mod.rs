//! Archive module - the keyed-archive payload codec.
//!
//! Every payload on the wire is a keyed archive: a binary plist whose
//! `$objects` table flattens an object graph, with UID references knitting
//! it back together. The format is defined by the in-app agent; this module
//! covers exactly the classes the bridge exchanges with it:
//!
//! - [`encode`] - flatten [`ArchiveValue`] graphs into archive bytes
//! - [`decode`] - resolve archive bytes back into [`ArchiveValue`] graphs,
//!   remapping platform-specific class names to host stand-ins
//! - [`geometry`] - the `"{{x, y}, {w, h}}"` struct-string forms geometry
//!   travels in
//! - [`classes`] - typed views over the decoded Lookin model objects
//!
//! Codecs are free functions over a plain value enum rather than serde
//! impls: the archive format addresses objects positionally through a UID
//! table, which does not map onto serde's data model.

use std::collections::HashMap;

pub mod classes;
pub mod decode;
pub mod encode;
pub mod geometry;

pub use decode::{decode_bytes, Unarchiver};
pub use encode::{encode_attachment, encode_root};
pub use geometry::{Insets, Point, Rect, Size};

/// A value in a decoded (or to-be-encoded) archive object graph.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveValue {
    /// The archive's `$null` sentinel.
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Data(Vec<u8>),
    Array(Vec<ArchiveValue>),
    /// String-keyed dictionary (`NSDictionary` on the wire).
    Dict(HashMap<String, ArchiveValue>),
    Point(Point),
    Size(Size),
    Rect(Rect),
    Insets(Insets),
    /// RGBA components in `[0, 1]`. Host stand-in for `UIColor`/`NSColor`.
    Color([f64; 4]),
    /// Raw encoded image bytes. Host stand-in for `UIImage`.
    Image(Vec<u8>),
    /// Any other archived class instance, kept as name + keyed fields.
    Object(ArchivedObject),
}

/// An archived class instance that has no dedicated [`ArchiveValue`] variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedObject {
    /// Class name after remapping (see [`decode`]).
    pub class_name: String,
    /// Keyed fields, `$`-prefixed bookkeeping keys excluded.
    pub fields: HashMap<String, ArchiveValue>,
}

impl ArchivedObject {
    /// Field accessor; absent fields read as `Null`.
    pub fn field(&self, key: &str) -> &ArchiveValue {
        self.fields.get(key).unwrap_or(&ArchiveValue::Null)
    }
}

impl ArchiveValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ArchiveValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArchiveValue::Bool(b) => Some(*b),
            ArchiveValue::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ArchiveValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Object identifiers are unsigned on the wire but stored signed in the
    /// plist integer node; this reinterprets the bits.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().map(|i| i as u64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ArchiveValue::Double(d) => Some(*d),
            ArchiveValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArchiveValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ArchiveValue]> {
        match self {
            ArchiveValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&HashMap<String, ArchiveValue>> {
        match self {
            ArchiveValue::Dict(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ArchivedObject> {
        match self {
            ArchiveValue::Object(obj) => Some(obj),
            _ => None,
        }
    }
}
