//! Text rendering for tool results.
//!
//! Tools return a single text block; these helpers turn the decoded model
//! objects into something an assistant can read without knowing the wire
//! format.

use std::collections::HashMap;

use crate::archive::classes::{AppInfo, AttributesGroup, DisplayItem, HierarchyInfo};
use crate::archive::{geometry, ArchiveValue};
use crate::requests::InvokeOutcome;

pub fn render_app_info(info: &AppInfo) -> String {
    let mut out = String::new();
    out.push_str(&format!("App: {}\n", fallback(&info.app_name)));
    out.push_str(&format!("Device: {}\n", fallback(&info.device_description)));
    out.push_str(&format!("OS: {}\n", fallback(&info.os_description)));
    out.push_str(&format!(
        "Screen: {} x {} @{}x\n",
        info.screen_width, info.screen_height, info.screen_scale
    ));
    out
}

fn fallback(s: &str) -> &str {
    if s.is_empty() {
        "(unknown)"
    } else {
        s
    }
}

/// One line per display item, indented by depth.
fn item_line(item: &DisplayItem, depth: usize, text_map: &HashMap<u64, String>) -> String {
    let mut line = String::new();
    line.push_str(&"  ".repeat(depth));
    line.push_str(item.class_name());
    let oid = if item.view_oid() != 0 {
        item.view_oid()
    } else {
        item.layer_oid()
    };
    line.push_str(&format!(" (oid {oid})"));

    if let Some(frame) = item.frame {
        line.push(' ');
        line.push_str(&geometry::format_rect(frame));
    }
    if item.hidden {
        line.push_str(" [hidden]");
    }
    if item.alpha < 1.0 {
        line.push_str(&format!(" [alpha {}]", item.alpha));
    }
    if let Some(text) = text_map.get(&item.view_oid()) {
        line.push_str(&format!(" {text:?}"));
    }
    line
}

pub fn render_hierarchy(hierarchy: &HierarchyInfo, text_map: &HashMap<u64, String>) -> String {
    let mut lines = Vec::new();
    hierarchy.walk(|item, depth| lines.push(item_line(item, depth, text_map)));
    if lines.is_empty() {
        return "(hierarchy is empty)".into();
    }
    lines.join("\n")
}

/// Render only the subtree rooted at `root`.
pub fn render_subtree(root: &DisplayItem, text_map: &HashMap<u64, String>) -> String {
    fn go(
        item: &DisplayItem,
        depth: usize,
        text_map: &HashMap<u64, String>,
        lines: &mut Vec<String>,
    ) {
        lines.push(item_line(item, depth, text_map));
        for sub in &item.subitems {
            go(sub, depth + 1, text_map, lines);
        }
    }
    let mut lines = Vec::new();
    go(root, 0, text_map, &mut lines);
    lines.join("\n")
}

/// Hierarchy lines whose class name or enriched text matches `query`,
/// case-insensitively.
pub fn render_search(
    query: &str,
    hierarchy: &HierarchyInfo,
    text_map: &HashMap<u64, String>,
) -> String {
    let needle = query.to_lowercase();
    let mut lines = Vec::new();
    hierarchy.walk(|item, _depth| {
        let class_hit = item.class_name().to_lowercase().contains(&needle);
        let text_hit = text_map
            .get(&item.view_oid())
            .map(|t| t.to_lowercase().contains(&needle))
            .unwrap_or(false);
        if class_hit || text_hit {
            lines.push(item_line(item, 0, text_map));
        }
    });

    if lines.is_empty() {
        format!("No views matching {query:?}")
    } else {
        format!(
            "{} view(s) matching {query:?}:\n{}",
            lines.len(),
            lines.join("\n")
        )
    }
}

/// Attribute groups as prose, one group per paragraph.
pub fn render_detail(oid: u64, groups: &[AttributesGroup]) -> String {
    if groups.is_empty() {
        return format!("No attributes reported for oid {oid}");
    }

    let mut out = format!("Attributes for oid {oid}:\n");
    for group in groups {
        out.push_str(&format!("\n[{}]\n", fallback(&group.identifier)));
        for section in &group.sections {
            for attr in &section.attributes {
                out.push_str(&format!(
                    "  {} = {}\n",
                    attr.identifier,
                    render_value(&attr.value)
                ));
            }
        }
    }
    out
}

pub fn render_invoke(selector: &str, outcome: &InvokeOutcome) -> String {
    match outcome {
        InvokeOutcome::Void => format!("{selector} returned void"),
        InvokeOutcome::Description(d) => format!("{selector} returned: {d}"),
    }
}

/// Human-readable form of any archive value.
pub fn render_value(value: &ArchiveValue) -> String {
    match value {
        ArchiveValue::Null => "null".into(),
        ArchiveValue::Bool(b) => b.to_string(),
        ArchiveValue::Integer(i) => i.to_string(),
        ArchiveValue::Double(d) => d.to_string(),
        ArchiveValue::String(s) => format!("{s:?}"),
        ArchiveValue::Data(d) => format!("<{} bytes>", d.len()),
        ArchiveValue::Array(items) => {
            let rendered: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", rendered.join(", "))
        }
        ArchiveValue::Dict(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by_key(|(k, _)| k.as_str());
            let rendered: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{k}: {}", render_value(v)))
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
        ArchiveValue::Point(p) => geometry::format_point(*p),
        ArchiveValue::Size(s) => geometry::format_size(*s),
        ArchiveValue::Rect(r) => geometry::format_rect(*r),
        ArchiveValue::Insets(i) => geometry::format_insets(*i),
        ArchiveValue::Color(rgba) => format!(
            "rgba({}, {}, {}, {})",
            rgba[0], rgba[1], rgba[2], rgba[3]
        ),
        ArchiveValue::Image(bytes) => format!("<image, {} bytes>", bytes.len()),
        ArchiveValue::Object(obj) => format!("<{}>", obj.class_name),
    }
}
