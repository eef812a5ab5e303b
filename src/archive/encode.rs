//! Keyed-archive encoding.
//!
//! Flattens an [`ArchiveValue`] graph into the `$objects` table of a binary
//! plist with `$archiver = NSKeyedArchiver`. Scalars stay inline in their
//! owner's keyed fields the way the agent's coder writes them; strings,
//! collections, and object instances become `$objects` entries referenced
//! by UID. Class descriptor entries are shared across instances.

use std::collections::HashMap;

use plist::{Dictionary, Uid, Value};

use super::{geometry, ArchiveValue};
use crate::error::{LookinError, Result};

/// Root class wrapping every request payload.
pub const ATTACHMENT_CLASS: &str = "LookinConnectionAttachment";

const ARCHIVER_NAME: &str = "NSKeyedArchiver";
const ARCHIVE_VERSION: u64 = 100_000;

struct Archiver {
    objects: Vec<Value>,
    class_uids: HashMap<String, u64>,
}

impl Archiver {
    fn new() -> Self {
        Self {
            // Index 0 is the $null sentinel by format definition.
            objects: vec![Value::String("$null".into())],
            class_uids: HashMap::new(),
        }
    }

    fn push(&mut self, value: Value) -> Uid {
        self.objects.push(value);
        Uid::new((self.objects.len() - 1) as u64)
    }

    /// UID of the class descriptor for `chain`, inserting it on first use.
    fn class_uid(&mut self, chain: &[&str]) -> Uid {
        let key = chain[0].to_string();
        if let Some(&idx) = self.class_uids.get(&key) {
            return Uid::new(idx);
        }

        let mut descriptor = Dictionary::new();
        descriptor.insert("$classname".into(), Value::String(key.clone()));
        descriptor.insert(
            "$classes".into(),
            Value::Array(chain.iter().map(|c| Value::String((*c).into())).collect()),
        );
        let uid = self.push(Value::Dictionary(descriptor));
        self.class_uids.insert(key, uid.get());
        uid
    }

    /// Encode `value` as an `$objects` entry and return its UID.
    fn encode_entry(&mut self, value: &ArchiveValue) -> Uid {
        match value {
            ArchiveValue::Null => Uid::new(0),
            ArchiveValue::Bool(b) => self.push(Value::Boolean(*b)),
            ArchiveValue::Integer(i) => self.push(Value::Integer((*i).into())),
            ArchiveValue::Double(d) => self.push(Value::Real(*d)),
            ArchiveValue::String(s) => self.push(Value::String(s.clone())),
            ArchiveValue::Data(d) => self.push(Value::Data(d.clone())),
            ArchiveValue::Point(p) => self.push(Value::String(geometry::format_point(*p))),
            ArchiveValue::Size(s) => self.push(Value::String(geometry::format_size(*s))),
            ArchiveValue::Rect(r) => self.push(Value::String(geometry::format_rect(*r))),
            ArchiveValue::Insets(i) => self.push(Value::String(geometry::format_insets(*i))),
            // Colors travel as a 4-element RGBA float list.
            ArchiveValue::Color(rgba) => {
                let components: Vec<ArchiveValue> =
                    rgba.iter().map(|c| ArchiveValue::Double(*c)).collect();
                self.encode_entry(&ArchiveValue::Array(components))
            }
            ArchiveValue::Image(bytes) => self.push(Value::Data(bytes.clone())),
            ArchiveValue::Array(items) => {
                let uids: Vec<Value> = items
                    .iter()
                    .map(|item| Value::Uid(self.encode_entry(item)))
                    .collect();
                let class = self.class_uid(&["NSArray", "NSObject"]);
                let mut dict = Dictionary::new();
                dict.insert("$class".into(), Value::Uid(class));
                dict.insert("NS.objects".into(), Value::Array(uids));
                self.push(Value::Dictionary(dict))
            }
            ArchiveValue::Dict(map) => {
                // Sorted for deterministic output.
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by_key(|(k, _)| k.as_str());

                let mut keys = Vec::with_capacity(entries.len());
                let mut values = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    keys.push(Value::Uid(self.push(Value::String(k.clone()))));
                    values.push(Value::Uid(self.encode_entry(v)));
                }

                let class = self.class_uid(&["NSDictionary", "NSObject"]);
                let mut dict = Dictionary::new();
                dict.insert("$class".into(), Value::Uid(class));
                dict.insert("NS.keys".into(), Value::Array(keys));
                dict.insert("NS.objects".into(), Value::Array(values));
                self.push(Value::Dictionary(dict))
            }
            ArchiveValue::Object(obj) => {
                let class = self.class_uid(&[obj.class_name.as_str(), "NSObject"]);
                let mut entries: Vec<_> = obj.fields.iter().collect();
                entries.sort_by_key(|(k, _)| k.as_str());

                let mut dict = Dictionary::new();
                dict.insert("$class".into(), Value::Uid(class));
                for (key, field) in entries {
                    let encoded = match field {
                        // Scalars inline, mirroring encodeBool:/encodeInteger:.
                        ArchiveValue::Bool(b) => Value::Boolean(*b),
                        ArchiveValue::Integer(i) => Value::Integer((*i).into()),
                        ArchiveValue::Double(d) => Value::Real(*d),
                        other => Value::Uid(self.encode_entry(other)),
                    };
                    dict.insert(key.clone(), encoded);
                }
                self.push(Value::Dictionary(dict))
            }
        }
    }

    fn finish(mut self, root: &ArchiveValue) -> Result<Vec<u8>> {
        let root_uid = self.encode_entry(root);

        let mut top = Dictionary::new();
        top.insert("root".into(), Value::Uid(root_uid));

        let mut archive = Dictionary::new();
        archive.insert("$version".into(), Value::Integer(ARCHIVE_VERSION.into()));
        archive.insert("$archiver".into(), Value::String(ARCHIVER_NAME.into()));
        archive.insert("$top".into(), Value::Dictionary(top));
        archive.insert("$objects".into(), Value::Array(self.objects));

        let mut out = Vec::new();
        Value::Dictionary(archive)
            .to_writer_binary(&mut out)
            .map_err(|e| LookinError::InvalidFrame(format!("archive encode failed: {e}")))?;
        Ok(out)
    }
}

/// Serialize `value` as the archive root.
pub fn encode_root(value: &ArchiveValue) -> Result<Vec<u8>> {
    Archiver::new().finish(value)
}

/// Wrap `data` in the canonical request envelope and serialize it.
pub fn encode_attachment(data: &ArchiveValue) -> Result<Vec<u8>> {
    let mut fields = HashMap::new();
    fields.insert("data".to_string(), data.clone());
    encode_root(&ArchiveValue::Object(super::ArchivedObject {
        class_name: ATTACHMENT_CLASS.into(),
        fields,
    }))
}
