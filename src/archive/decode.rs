//! Keyed-archive decoding with class-name remapping.
//!
//! The agent archives platform classes (`UIImage`, `UIColor`) that do not
//! exist on this side of the socket. Before an object is materialized its
//! class name is pushed through a remap table - a global one plus any
//! per-decoder overrides - so those graphs land in host stand-ins that keep
//! just the shape downstream code reads: bytes for images, RGBA components
//! for colors.
//!
//! Structural problems (missing `$objects`, dangling UIDs, reference
//! cycles, a non-archive plist) all surface as `InvalidFrame`.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;

use plist::Value;

use super::{ArchiveValue, ArchivedObject};
use crate::error::{LookinError, Result};

/// Class names rebound on every decode.
const GLOBAL_CLASS_MAP: &[(&str, &str)] = &[
    ("UIImage", "LookinImage"),
    ("NSImage", "LookinImage"),
    ("UIColor", "LookinColor"),
    ("NSColor", "LookinColor"),
];

fn invalid(msg: impl Into<String>) -> LookinError {
    LookinError::InvalidFrame(msg.into())
}

fn uid_of(value: &Value) -> Option<u64> {
    match value {
        Value::Uid(uid) => Some(uid.get()),
        _ => None,
    }
}

/// A parsed archive ready for object-graph resolution.
pub struct Unarchiver {
    objects: Vec<Value>,
    root: u64,
    class_map: HashMap<String, String>,
}

impl Unarchiver {
    /// Parse the binary-plist container and locate the object table.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let value = Value::from_reader(Cursor::new(bytes))
            .map_err(|e| invalid(format!("not a plist: {e}")))?;
        let dict = value
            .as_dictionary()
            .ok_or_else(|| invalid("archive root is not a dictionary"))?;

        if let Some(archiver) = dict.get("$archiver").and_then(Value::as_string) {
            if !archiver.contains("NSKeyedArchiver") {
                return Err(invalid(format!("unexpected archiver {archiver:?}")));
            }
        }

        let objects = dict
            .get("$objects")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("archive has no $objects table"))?
            .to_vec();

        let root = dict
            .get("$top")
            .and_then(Value::as_dictionary)
            .and_then(|top| top.get("root"))
            .and_then(uid_of)
            .ok_or_else(|| invalid("archive has no $top.root"))?;

        Ok(Self {
            objects,
            root,
            class_map: HashMap::new(),
        })
    }

    /// Add a per-decoder class rebinding, consulted before the global table.
    pub fn insert_class_mapping(&mut self, from: &str, to: &str) {
        self.class_map.insert(from.to_string(), to.to_string());
    }

    fn remap(&self, name: &str) -> String {
        if let Some(to) = self.class_map.get(name) {
            return to.clone();
        }
        for (from, to) in GLOBAL_CLASS_MAP {
            if *from == name {
                return (*to).to_string();
            }
        }
        name.to_string()
    }

    /// Resolve the object graph starting at `$top.root`.
    pub fn decode_root(&self) -> Result<ArchiveValue> {
        let mut visiting = HashSet::new();
        self.resolve_uid(self.root, &mut visiting)
    }

    fn resolve_uid(&self, uid: u64, visiting: &mut HashSet<u64>) -> Result<ArchiveValue> {
        if uid == 0 {
            return Ok(ArchiveValue::Null);
        }
        let value = self
            .objects
            .get(uid as usize)
            .ok_or_else(|| invalid(format!("dangling UID {uid}")))?;
        if !visiting.insert(uid) {
            return Err(invalid(format!("reference cycle through UID {uid}")));
        }
        let out = self.resolve_value(value, visiting);
        visiting.remove(&uid);
        out
    }

    fn resolve_value(&self, value: &Value, visiting: &mut HashSet<u64>) -> Result<ArchiveValue> {
        match value {
            Value::String(s) if s == "$null" => Ok(ArchiveValue::Null),
            Value::String(s) => Ok(ArchiveValue::String(s.clone())),
            Value::Boolean(b) => Ok(ArchiveValue::Bool(*b)),
            Value::Integer(i) => {
                let n = i
                    .as_signed()
                    .or_else(|| i.as_unsigned().map(|u| u as i64))
                    .ok_or_else(|| invalid("integer out of range"))?;
                Ok(ArchiveValue::Integer(n))
            }
            Value::Real(r) => Ok(ArchiveValue::Double(*r)),
            Value::Data(d) => Ok(ArchiveValue::Data(d.clone())),
            Value::Uid(uid) => self.resolve_uid(uid.get(), visiting),
            Value::Array(items) => {
                let resolved: Result<Vec<_>> = items
                    .iter()
                    .map(|item| self.resolve_value(item, visiting))
                    .collect();
                Ok(ArchiveValue::Array(resolved?))
            }
            Value::Dictionary(dict) if dict.contains_key("$class") => {
                self.resolve_object(dict, visiting)
            }
            Value::Dictionary(dict) => {
                let mut out = HashMap::new();
                for (k, v) in dict.iter() {
                    out.insert(k.to_string(), self.resolve_value(v, visiting)?);
                }
                Ok(ArchiveValue::Dict(out))
            }
            other => Err(invalid(format!("unsupported plist node {other:?}"))),
        }
    }

    fn class_name_of(&self, dict: &plist::Dictionary) -> Result<String> {
        let uid = dict
            .get("$class")
            .and_then(uid_of)
            .ok_or_else(|| invalid("$class is not a UID"))?;
        let descriptor = self
            .objects
            .get(uid as usize)
            .and_then(Value::as_dictionary)
            .ok_or_else(|| invalid(format!("dangling class descriptor UID {uid}")))?;
        let name = descriptor
            .get("$classname")
            .and_then(Value::as_string)
            .ok_or_else(|| invalid("class descriptor has no $classname"))?;
        Ok(self.remap(name))
    }

    fn resolve_object(
        &self,
        dict: &plist::Dictionary,
        visiting: &mut HashSet<u64>,
    ) -> Result<ArchiveValue> {
        let class_name = self.class_name_of(dict)?;

        match class_name.as_str() {
            "NSArray" | "NSMutableArray" | "NSSet" | "NSMutableSet" => {
                let items = dict
                    .get("NS.objects")
                    .and_then(Value::as_array)
                    .ok_or_else(|| invalid(format!("{class_name} has no NS.objects")))?;
                let resolved: Result<Vec<_>> = items
                    .iter()
                    .map(|item| self.resolve_value(item, visiting))
                    .collect();
                Ok(ArchiveValue::Array(resolved?))
            }
            "NSDictionary" | "NSMutableDictionary" => {
                let keys = dict
                    .get("NS.keys")
                    .and_then(Value::as_array)
                    .ok_or_else(|| invalid("dictionary has no NS.keys"))?;
                let values = dict
                    .get("NS.objects")
                    .and_then(Value::as_array)
                    .ok_or_else(|| invalid("dictionary has no NS.objects"))?;
                if keys.len() != values.len() {
                    return Err(invalid("dictionary key/value count mismatch"));
                }

                let mut out = HashMap::new();
                for (k, v) in keys.iter().zip(values) {
                    let key = self.resolve_value(k, visiting)?;
                    let key = key
                        .as_str()
                        .ok_or_else(|| invalid("non-string dictionary key"))?
                        .to_string();
                    out.insert(key, self.resolve_value(v, visiting)?);
                }
                Ok(ArchiveValue::Dict(out))
            }
            "NSString" | "NSMutableString" => {
                let s = dict
                    .get("NS.string")
                    .and_then(Value::as_string)
                    .ok_or_else(|| invalid("NSString has no NS.string"))?;
                Ok(ArchiveValue::String(s.to_string()))
            }
            "NSData" | "NSMutableData" => {
                let d = dict
                    .get("NS.data")
                    .and_then(Value::as_data)
                    .ok_or_else(|| invalid("NSData has no NS.data"))?;
                Ok(ArchiveValue::Data(d.to_vec()))
            }
            // Host stand-in for UIImage: keep the encoded bytes, nothing else.
            "LookinImage" => {
                for (key, v) in dict.iter() {
                    if key.starts_with('$') {
                        continue;
                    }
                    if let ArchiveValue::Data(bytes) = self.resolve_value(v, visiting)? {
                        return Ok(ArchiveValue::Image(bytes));
                    }
                }
                Ok(ArchiveValue::Image(Vec::new()))
            }
            // Host stand-in for UIColor: RGBA components only.
            "LookinColor" => {
                let mut component = |key: &str, default: f64| -> Result<f64> {
                    match dict.get(key) {
                        Some(v) => Ok(self.resolve_value(v, visiting)?.as_f64().unwrap_or(default)),
                        None => Ok(default),
                    }
                };
                Ok(ArchiveValue::Color([
                    component("UIRed", 0.0)?,
                    component("UIGreen", 0.0)?,
                    component("UIBlue", 0.0)?,
                    component("UIAlpha", 1.0)?,
                ]))
            }
            _ => {
                let mut fields = HashMap::new();
                for (key, v) in dict.iter() {
                    if key.starts_with('$') {
                        continue;
                    }
                    fields.insert(key.to_string(), self.resolve_value(v, visiting)?);
                }
                Ok(ArchiveValue::Object(ArchivedObject { class_name, fields }))
            }
        }
    }
}

/// Parse and resolve an archive in one step.
pub fn decode_bytes(bytes: &[u8]) -> Result<ArchiveValue> {
    Unarchiver::from_bytes(bytes)?.decode_root()
}
