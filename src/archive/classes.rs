//! Typed views over the Lookin model classes carried in archives.
//!
//! Parsing is deliberately tolerant: the agent has shipped several wire
//! generations and fields come and go. A missing field falls back to a
//! default; only a wrong *root* shape is an error, because that means the
//! response cannot be the answer to the request that was sent.

use std::collections::HashMap;

use super::{decode_bytes, geometry, ArchiveValue, ArchivedObject, Rect};
use crate::error::{LookinError, Result};

/// Version string the agent logs for compatibility diagnostics.
pub const CLIENT_READABLE_VERSION: &str = concat!("LookinMCP ", env!("CARGO_PKG_VERSION"));

/// Marker the agent returns from a `void` method invocation.
pub const VOID_RETURN_SENTINEL: &str = "LOOKIN_TAG_RETURN_VALUE_VOID";

const RESPONSE_ATTACHMENT_CLASS: &str = "LookinConnectionResponseAttachment";

fn invalid(msg: impl Into<String>) -> LookinError {
    LookinError::InvalidFrame(msg.into())
}

/// The response envelope wrapping every reply payload.
#[derive(Debug, Clone)]
pub struct ConnectionResponse {
    /// Operation result; `Null` when the server sent nothing.
    pub data: ArchiveValue,
    /// Server-side failure, already rendered to a message.
    pub error: Option<String>,
    /// Whether the app was backgrounded when it answered.
    pub app_is_in_background: bool,
}

impl ConnectionResponse {
    /// Envelope for an empty reply payload (ping from a foreground app).
    pub fn empty() -> Self {
        Self {
            data: ArchiveValue::Null,
            error: None,
            app_is_in_background: false,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let root = decode_bytes(bytes)?;
        let obj = root
            .as_object()
            .filter(|o| o.class_name == RESPONSE_ATTACHMENT_CLASS)
            .ok_or_else(|| invalid("response root is not a response attachment"))?;

        let error = match obj.field("error") {
            ArchiveValue::Null => None,
            ArchiveValue::String(s) => Some(s.clone()),
            ArchiveValue::Object(err) => Some(render_ns_error(err)),
            other => Some(format!("{other:?}")),
        };

        Ok(Self {
            data: obj.field("data").clone(),
            error,
            app_is_in_background: obj.field("appIsInBackground").as_bool().unwrap_or(false),
        })
    }
}

/// Render an archived `NSError` into a one-line message.
fn render_ns_error(err: &ArchivedObject) -> String {
    let description = err
        .field("NSUserInfo")
        .as_dict()
        .and_then(|info| info.get("NSLocalizedDescription"))
        .and_then(ArchiveValue::as_str);
    if let Some(description) = description {
        return description.to_string();
    }

    let domain = err.field("NSDomain").as_str().unwrap_or("unknown domain");
    let code = err.field("NSCode").as_i64().unwrap_or(0);
    format!("{domain} (code {code})")
}

/// App metadata returned by request code 201.
#[derive(Debug, Clone, Default)]
pub struct AppInfo {
    pub app_name: String,
    pub device_description: String,
    pub os_description: String,
    pub screen_width: f64,
    pub screen_height: f64,
    pub screen_scale: f64,
}

impl AppInfo {
    pub fn from_value(value: &ArchiveValue) -> Result<Self> {
        let obj = value
            .as_object()
            .filter(|o| o.class_name == "LookinAppInfo")
            .ok_or_else(|| invalid("expected LookinAppInfo"))?;
        Ok(Self {
            app_name: string_field(obj, "appName"),
            device_description: string_field(obj, "deviceDescription"),
            os_description: string_field(obj, "osDescription"),
            screen_width: obj.field("screenWidth").as_f64().unwrap_or(0.0),
            screen_height: obj.field("screenHeight").as_f64().unwrap_or(0.0),
            screen_scale: obj.field("screenScale").as_f64().unwrap_or(0.0),
        })
    }
}

fn string_field(obj: &ArchivedObject, key: &str) -> String {
    obj.field(key).as_str().unwrap_or_default().to_string()
}

/// One side (view or layer) of a display item.
#[derive(Debug, Clone, Default)]
pub struct LookinObject {
    pub oid: u64,
    /// Most-derived class first.
    pub class_chain: Vec<String>,
}

impl LookinObject {
    fn from_value(value: &ArchiveValue) -> Option<Self> {
        let obj = value.as_object()?;
        let class_chain = obj
            .field("classChainList")
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            oid: obj.field("oid").as_u64().unwrap_or(0),
            class_chain,
        })
    }

    pub fn class_name(&self) -> &str {
        self.class_chain.first().map(String::as_str).unwrap_or("?")
    }
}

/// One node of the view hierarchy.
#[derive(Debug, Clone, Default)]
pub struct DisplayItem {
    pub view_object: Option<LookinObject>,
    pub layer_object: Option<LookinObject>,
    pub frame: Option<Rect>,
    pub hidden: bool,
    pub alpha: f64,
    pub subitems: Vec<DisplayItem>,
}

impl DisplayItem {
    pub fn from_value(value: &ArchiveValue) -> Result<Self> {
        let obj = value
            .as_object()
            .filter(|o| o.class_name == "LookinDisplayItem")
            .ok_or_else(|| invalid("expected LookinDisplayItem"))?;

        let frame = match obj.field("frame") {
            ArchiveValue::String(s) => geometry::parse_rect(s).ok(),
            ArchiveValue::Rect(r) => Some(*r),
            _ => None,
        };

        let subitems = match obj.field("subitems") {
            ArchiveValue::Array(items) => items
                .iter()
                .map(DisplayItem::from_value)
                .collect::<Result<Vec<_>>>()?,
            _ => Vec::new(),
        };

        Ok(Self {
            view_object: LookinObject::from_value(obj.field("viewObject")),
            layer_object: LookinObject::from_value(obj.field("layerObject")),
            frame,
            hidden: obj.field("isHidden").as_bool().unwrap_or(false),
            alpha: obj.field("alpha").as_f64().unwrap_or(1.0),
            subitems,
        })
    }

    /// OID of the backing view; 0 for layer-only items.
    pub fn view_oid(&self) -> u64 {
        self.view_object.as_ref().map(|o| o.oid).unwrap_or(0)
    }

    /// OID of the backing layer; falls back to the view's for odd items.
    pub fn layer_oid(&self) -> u64 {
        self.layer_object
            .as_ref()
            .map(|o| o.oid)
            .unwrap_or_else(|| self.view_oid())
    }

    /// Displayed class name, preferring the view side.
    pub fn class_name(&self) -> &str {
        self.view_object
            .as_ref()
            .or(self.layer_object.as_ref())
            .map(|o| o.class_name())
            .unwrap_or("?")
    }

    /// Whether any class in either chain matches `predicate`.
    pub fn class_chain_matches(&self, predicate: impl Fn(&str) -> bool) -> bool {
        self.view_object
            .iter()
            .chain(self.layer_object.iter())
            .flat_map(|o| o.class_chain.iter())
            .any(|c| predicate(c))
    }
}

/// The full hierarchy snapshot returned by request code 202.
#[derive(Debug, Clone, Default)]
pub struct HierarchyInfo {
    pub display_items: Vec<DisplayItem>,
    pub app_info: Option<AppInfo>,
}

impl HierarchyInfo {
    pub fn from_value(value: &ArchiveValue) -> Result<Self> {
        let obj = value
            .as_object()
            .filter(|o| o.class_name == "LookinHierarchyInfo")
            .ok_or_else(|| invalid("expected LookinHierarchyInfo"))?;

        let display_items = obj
            .field("displayItems")
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(DisplayItem::from_value)
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let app_info = AppInfo::from_value(obj.field("appInfo")).ok();

        Ok(Self {
            display_items,
            app_info,
        })
    }

    /// Depth-first walk over every item in the snapshot.
    pub fn walk(&self, mut visit: impl FnMut(&DisplayItem, usize)) {
        fn go(item: &DisplayItem, depth: usize, visit: &mut impl FnMut(&DisplayItem, usize)) {
            visit(item, depth);
            for sub in &item.subitems {
                go(sub, depth + 1, visit);
            }
        }
        for item in &self.display_items {
            go(item, 0, &mut visit);
        }
    }

    /// Find an item whose view or layer oid equals `oid`.
    pub fn find_by_oid(&self, oid: u64) -> Option<&DisplayItem> {
        fn go(item: &DisplayItem, oid: u64) -> Option<&DisplayItem> {
            if item.view_oid() == oid || item.layer_oid() == oid {
                return Some(item);
            }
            item.subitems.iter().find_map(|sub| go(sub, oid))
        }
        self.display_items.iter().find_map(|item| go(item, oid))
    }
}

/// One attribute group (per class section) from request code 210.
#[derive(Debug, Clone)]
pub struct AttributesGroup {
    pub identifier: String,
    pub sections: Vec<AttributesSection>,
}

#[derive(Debug, Clone)]
pub struct AttributesSection {
    pub identifier: String,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub identifier: String,
    pub attr_type: i64,
    pub value: ArchiveValue,
}

impl AttributesGroup {
    pub fn from_value(value: &ArchiveValue) -> Result<Self> {
        let obj = value
            .as_object()
            .filter(|o| o.class_name == "LookinAttributesGroup")
            .ok_or_else(|| invalid("expected LookinAttributesGroup"))?;

        let sections = obj
            .field("attrSections")
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(AttributesSection::from_value)
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            identifier: string_field(obj, "identifier"),
            sections,
        })
    }
}

impl AttributesSection {
    fn from_value(value: &ArchiveValue) -> Result<Self> {
        let obj = value
            .as_object()
            .filter(|o| o.class_name == "LookinAttributesSection")
            .ok_or_else(|| invalid("expected LookinAttributesSection"))?;

        let attributes = obj
            .field("attributes")
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(Attribute::from_value)
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            identifier: string_field(obj, "identifier"),
            attributes,
        })
    }
}

impl Attribute {
    fn from_value(value: &ArchiveValue) -> Result<Self> {
        let obj = value
            .as_object()
            .filter(|o| o.class_name == "LookinAttribute")
            .ok_or_else(|| invalid("expected LookinAttribute"))?;
        Ok(Self {
            identifier: string_field(obj, "identifier"),
            attr_type: obj.field("attrType").as_i64().unwrap_or(0),
            value: obj.field("value").clone(),
        })
    }
}

/// Success indicator returned for an attribute modification.
#[derive(Debug, Clone, Default)]
pub struct DisplayItemDetail {
    pub oid: u64,
}

impl DisplayItemDetail {
    pub fn from_value(value: &ArchiveValue) -> Result<Self> {
        let obj = value
            .as_object()
            .filter(|o| o.class_name == "LookinDisplayItemDetail")
            .ok_or_else(|| invalid("expected LookinDisplayItemDetail"))?;
        Ok(Self {
            oid: obj.field("oid").as_u64().unwrap_or(0),
        })
    }
}

/// Request payload for code 204: set one attribute on a view or layer.
#[derive(Debug, Clone)]
pub struct AttributeModification {
    pub target_oid: u64,
    pub setter_selector: String,
    pub attr_type: i64,
    pub value: ArchiveValue,
}

impl AttributeModification {
    /// Archive object the agent's secure decoder expects.
    pub fn to_value(&self) -> ArchiveValue {
        let mut fields = HashMap::new();
        fields.insert(
            "targetOid".to_string(),
            ArchiveValue::Integer(self.target_oid as i64),
        );
        fields.insert(
            "setterSelector".to_string(),
            ArchiveValue::String(self.setter_selector.clone()),
        );
        fields.insert("attrType".to_string(), ArchiveValue::Integer(self.attr_type));
        fields.insert("value".to_string(), self.value.clone());
        fields.insert(
            "clientReadableVersion".to_string(),
            ArchiveValue::String(CLIENT_READABLE_VERSION.to_string()),
        );
        ArchiveValue::Object(ArchivedObject {
            class_name: "LookinAttributeModification".into(),
            fields,
        })
    }
}
