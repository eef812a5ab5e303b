//! Attribute registry and user-value parsing.
//!
//! A curated table maps friendly attribute names to the wire tuple the
//! agent needs for an inbuilt modification: server identifier, setter
//! selector, type code, and whether the setter lives on the view or its
//! layer. Unlisted attributes are simply unsupported by friendly name.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::archive::{geometry, ArchiveValue};
use crate::error::{LookinError, Result};

/// Pseudo-name intercepted before registry lookup; expands to the help text.
pub const HELP_NAME: &str = "help";

/// Whether a setter addresses the view or its backing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    View,
    Layer,
}

/// Value type codes shared with the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    Int,
    Long,
    Float,
    Double,
    Bool,
    Point,
    Size,
    Rect,
    EdgeInsets,
    String,
    EnumInt,
    EnumLong,
    Color,
}

impl AttrType {
    /// Numeric code on the wire.
    pub fn code(self) -> i64 {
        match self {
            AttrType::Int => 3,
            AttrType::Long => 5,
            AttrType::Float => 12,
            AttrType::Double => 13,
            AttrType::Bool => 14,
            AttrType::Point => 17,
            AttrType::Size => 19,
            AttrType::Rect => 20,
            AttrType::EdgeInsets => 22,
            AttrType::String => 23,
            AttrType::EnumInt => 24,
            AttrType::EnumLong => 25,
            AttrType::Color => 27,
        }
    }
}

/// Registry entry: everything needed to build a modification request.
#[derive(Debug, Clone, Copy)]
pub struct AttributeMapping {
    pub name: &'static str,
    /// Server-side attribute identifier.
    pub identifier: &'static str,
    /// Objective-C setter selector string.
    pub setter: &'static str,
    pub attr_type: AttrType,
    pub target: TargetKind,
    /// Whether the agent needs its method patch installed for this setter.
    pub needs_patch: bool,
    /// One-line syntax description shown by `help`.
    pub value_help: &'static str,
}

const MAPPINGS: &[AttributeMapping] = &[
    AttributeMapping {
        name: "hidden",
        identifier: "v_v_hidden",
        setter: "setHidden:",
        attr_type: AttrType::Bool,
        target: TargetKind::View,
        needs_patch: false,
        value_help: "true/false, yes/no, 1/0",
    },
    AttributeMapping {
        name: "alpha",
        identifier: "v_v_alpha",
        setter: "setAlpha:",
        attr_type: AttrType::Double,
        target: TargetKind::View,
        needs_patch: false,
        value_help: "decimal in [0, 1], e.g. 0.5",
    },
    AttributeMapping {
        name: "frame",
        identifier: "v_f_frame",
        setter: "setFrame:",
        attr_type: AttrType::Rect,
        target: TargetKind::View,
        needs_patch: false,
        value_help: "x,y,width,height e.g. 0,0,390,100",
    },
    AttributeMapping {
        name: "bounds",
        identifier: "v_f_bounds",
        setter: "setBounds:",
        attr_type: AttrType::Rect,
        target: TargetKind::View,
        needs_patch: false,
        value_help: "x,y,width,height",
    },
    AttributeMapping {
        name: "backgroundColor",
        identifier: "v_bg_color",
        setter: "setBackgroundColor:",
        attr_type: AttrType::Color,
        target: TargetKind::View,
        needs_patch: false,
        value_help: "#RRGGBB, #RRGGBBAA, or r,g,b[,a] floats in [0, 1]",
    },
    AttributeMapping {
        name: "tintColor",
        identifier: "v_tint_color",
        setter: "setTintColor:",
        attr_type: AttrType::Color,
        target: TargetKind::View,
        needs_patch: false,
        value_help: "#RRGGBB, #RRGGBBAA, or r,g,b[,a] floats in [0, 1]",
    },
    AttributeMapping {
        name: "clipsToBounds",
        identifier: "v_v_clips",
        setter: "setClipsToBounds:",
        attr_type: AttrType::Bool,
        target: TargetKind::View,
        needs_patch: false,
        value_help: "true/false",
    },
    AttributeMapping {
        name: "userInteractionEnabled",
        identifier: "v_ia_interaction",
        setter: "setUserInteractionEnabled:",
        attr_type: AttrType::Bool,
        target: TargetKind::View,
        needs_patch: false,
        value_help: "true/false",
    },
    AttributeMapping {
        name: "contentMode",
        identifier: "v_v_contentMode",
        setter: "setContentMode:",
        attr_type: AttrType::EnumInt,
        target: TargetKind::View,
        needs_patch: false,
        value_help: "UIViewContentMode raw value, e.g. 1 for scaleAspectFit",
    },
    AttributeMapping {
        name: "tag",
        identifier: "v_v_tag",
        setter: "setTag:",
        attr_type: AttrType::Long,
        target: TargetKind::View,
        needs_patch: false,
        value_help: "signed integer",
    },
    AttributeMapping {
        name: "text",
        identifier: "lb_t_t",
        setter: "setText:",
        attr_type: AttrType::String,
        target: TargetKind::View,
        needs_patch: false,
        value_help: "any string, passed verbatim",
    },
    AttributeMapping {
        name: "textColor",
        identifier: "lb_t_color",
        setter: "setTextColor:",
        attr_type: AttrType::Color,
        target: TargetKind::View,
        needs_patch: false,
        value_help: "#RRGGBB, #RRGGBBAA, or r,g,b[,a] floats in [0, 1]",
    },
    AttributeMapping {
        name: "contentInset",
        identifier: "sv_ci_inset",
        setter: "setContentInset:",
        attr_type: AttrType::EdgeInsets,
        target: TargetKind::View,
        needs_patch: false,
        value_help: "top,left,bottom,right",
    },
    AttributeMapping {
        name: "cornerRadius",
        identifier: "l_c_radius",
        setter: "setCornerRadius:",
        attr_type: AttrType::Double,
        target: TargetKind::Layer,
        needs_patch: false,
        value_help: "decimal points, e.g. 12.5",
    },
    AttributeMapping {
        name: "borderWidth",
        identifier: "l_b_width",
        setter: "setBorderWidth:",
        attr_type: AttrType::Double,
        target: TargetKind::Layer,
        needs_patch: false,
        value_help: "decimal points",
    },
    AttributeMapping {
        name: "masksToBounds",
        identifier: "l_c_masks",
        setter: "setMasksToBounds:",
        attr_type: AttrType::Bool,
        target: TargetKind::Layer,
        needs_patch: false,
        value_help: "true/false",
    },
    AttributeMapping {
        name: "opacity",
        identifier: "l_v_opacity",
        setter: "setOpacity:",
        attr_type: AttrType::Float,
        target: TargetKind::Layer,
        needs_patch: false,
        value_help: "decimal in [0, 1]",
    },
    AttributeMapping {
        name: "position",
        identifier: "l_f_position",
        setter: "setPosition:",
        attr_type: AttrType::Point,
        target: TargetKind::Layer,
        needs_patch: false,
        value_help: "x,y",
    },
    AttributeMapping {
        name: "shadowOpacity",
        identifier: "l_s_opacity",
        setter: "setShadowOpacity:",
        attr_type: AttrType::Float,
        target: TargetKind::Layer,
        needs_patch: true,
        value_help: "decimal in [0, 1]",
    },
    AttributeMapping {
        name: "shadowRadius",
        identifier: "l_s_radius",
        setter: "setShadowRadius:",
        attr_type: AttrType::Double,
        target: TargetKind::Layer,
        needs_patch: true,
        value_help: "decimal points",
    },
];

static REGISTRY: Lazy<HashMap<&'static str, &'static AttributeMapping>> =
    Lazy::new(|| MAPPINGS.iter().map(|m| (m.name, m)).collect());

/// Look up a friendly attribute name. Case-sensitive.
pub fn lookup(name: &str) -> Result<&'static AttributeMapping> {
    REGISTRY
        .get(name)
        .copied()
        .ok_or_else(|| LookinError::UnknownAttribute(name.to_string()))
}

/// Full help text listing every supported attribute.
pub fn help_text() -> String {
    let mut out = String::from("Modifiable attributes (name: expected value):\n");
    for m in MAPPINGS {
        let target = match m.target {
            TargetKind::View => "view",
            TargetKind::Layer => "layer",
        };
        out.push_str(&format!(
            "  {} ({}, via {}): {}\n",
            m.name, target, m.setter, m.value_help
        ));
    }
    out
}

fn parse_error(mapping: &AttributeMapping, raw: &str, reason: &str) -> LookinError {
    LookinError::ParseError(format!(
        "cannot parse {raw:?} for attribute {:?}: {reason} (expected {})",
        mapping.name, mapping.value_help
    ))
}

/// Parse a user-supplied string into the archive value for `mapping`.
pub fn parse_value(mapping: &AttributeMapping, raw: &str) -> Result<ArchiveValue> {
    let trimmed = raw.trim();
    match mapping.attr_type {
        AttrType::Bool => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(ArchiveValue::Bool(true)),
            "false" | "no" | "0" => Ok(ArchiveValue::Bool(false)),
            _ => Err(parse_error(mapping, raw, "not a boolean")),
        },
        AttrType::Int | AttrType::Long | AttrType::EnumInt | AttrType::EnumLong => trimmed
            .parse::<i64>()
            .map(ArchiveValue::Integer)
            .map_err(|_| parse_error(mapping, raw, "not an integer")),
        AttrType::Float | AttrType::Double => trimmed
            .parse::<f64>()
            .map(ArchiveValue::Double)
            .map_err(|_| parse_error(mapping, raw, "not a number")),
        AttrType::String => Ok(ArchiveValue::String(raw.to_string())),
        AttrType::Point => {
            let n = parse_components(trimmed, 2)
                .map_err(|reason| parse_error(mapping, raw, &reason))?;
            Ok(ArchiveValue::Point(geometry::Point { x: n[0], y: n[1] }))
        }
        AttrType::Size => {
            let n = parse_components(trimmed, 2)
                .map_err(|reason| parse_error(mapping, raw, &reason))?;
            Ok(ArchiveValue::Size(geometry::Size { w: n[0], h: n[1] }))
        }
        AttrType::Rect => {
            let n = parse_components(trimmed, 4)
                .map_err(|reason| parse_error(mapping, raw, &reason))?;
            Ok(ArchiveValue::Rect(geometry::Rect {
                x: n[0],
                y: n[1],
                w: n[2],
                h: n[3],
            }))
        }
        AttrType::EdgeInsets => {
            let n = parse_components(trimmed, 4)
                .map_err(|reason| parse_error(mapping, raw, &reason))?;
            Ok(ArchiveValue::Insets(geometry::Insets {
                top: n[0],
                left: n[1],
                bottom: n[2],
                right: n[3],
            }))
        }
        AttrType::Color => parse_color(trimmed)
            .map(ArchiveValue::Color)
            .map_err(|reason| parse_error(mapping, raw, &reason)),
    }
}

/// Comma-separated decimals with a required arity.
fn parse_components(s: &str, arity: usize) -> std::result::Result<Vec<f64>, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != arity {
        return Err(format!("expected {arity} comma-separated numbers"));
    }
    parts
        .iter()
        .map(|p| {
            p.parse::<f64>()
                .map_err(|_| format!("{p:?} is not a number"))
        })
        .collect()
}

/// Parse `#RRGGBB`, `#RRGGBBAA`, or 3/4 comma-separated floats in `[0, 1]`.
pub fn parse_color(s: &str) -> std::result::Result<[f64; 4], String> {
    if let Some(hex) = s.strip_prefix('#') {
        if !(hex.len() == 6 || hex.len() == 8) {
            return Err("hex colors need 6 or 8 digits".into());
        }
        let mut bytes = [0u8; 4];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| "invalid hex".to_string())?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| format!("bad hex pair {pair:?}"))?;
        }
        let alpha = if hex.len() == 8 {
            bytes[3] as f64 / 255.0
        } else {
            1.0
        };
        return Ok([
            bytes[0] as f64 / 255.0,
            bytes[1] as f64 / 255.0,
            bytes[2] as f64 / 255.0,
            alpha,
        ]);
    }

    if s.contains(',') {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if !(parts.len() == 3 || parts.len() == 4) {
            return Err("expected 3 or 4 color components".into());
        }
        let mut components = [0.0, 0.0, 0.0, 1.0];
        for (i, part) in parts.iter().enumerate() {
            let c: f64 = part
                .parse()
                .map_err(|_| format!("{part:?} is not a number"))?;
            if !(0.0..=1.0).contains(&c) {
                return Err(format!("component {c} outside [0, 1]"));
            }
            components[i] = c;
        }
        return Ok(components);
    }

    // Bare hex without '#' is rejected on purpose; too easy to confuse
    // with an integer attribute value.
    Err("expected #RRGGBB, #RRGGBBAA, or comma-separated floats".into())
}
