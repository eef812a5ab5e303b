//! MCP server: line-delimited JSON-RPC loop and tool dispatch.
//!
//! The host runs tool calls serially, which is what lets the session get
//! away without internal locking. Each tool returns a single text block;
//! failures flag the envelope and carry the error's display message.

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::protocol::{self, error_codes, JsonRpcRequest};
use super::{render, stdio};
use crate::attributes;
use crate::error::{LookinError, Result};
use crate::session::Session;

/// Serve MCP over stdin/stdout until EOF.
pub async fn serve_stdio() -> std::io::Result<()> {
    let mut session = Session::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    tracing::info!("lookin-mcp serving on stdio");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request line");
                stdio::write_stdout_json(&protocol::error(
                    &Value::Null,
                    error_codes::PARSE_ERROR,
                    &format!("parse error: {e}"),
                ))?;
                continue;
            }
        };

        if let Some(response) = handle_request(&mut session, request).await {
            stdio::write_stdout_json(&response)?;
        }
    }

    tracing::info!("stdin closed, shutting down");
    session.disconnect();
    Ok(())
}

/// Handle one request; `None` for notifications.
async fn handle_request(session: &mut Session, request: JsonRpcRequest) -> Option<Value> {
    if request.is_notification() {
        tracing::debug!(method = %request.method, "notification");
        return None;
    }
    let id = request.id.clone().unwrap_or(Value::Null);

    let response = match request.method.as_str() {
        "initialize" => protocol::success(
            &id,
            json!({
                "protocolVersion": protocol::PROTOCOL_REVISION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": "lookin-mcp",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),
        "ping" => protocol::success(&id, json!({})),
        "tools/list" => protocol::success(&id, json!({ "tools": tool_definitions() })),
        "tools/call" => {
            let name = request.params.get("name").and_then(Value::as_str);
            let arguments = request
                .params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            match name {
                Some(name) => {
                    let (text, is_error) = dispatch_tool(session, name, &arguments).await;
                    protocol::success(&id, protocol::tool_text(&text, is_error))
                }
                None => protocol::error(
                    &id,
                    error_codes::INVALID_PARAMS,
                    "tools/call requires a tool name",
                ),
            }
        }
        other => protocol::error(
            &id,
            error_codes::METHOD_NOT_FOUND,
            &format!("unknown method {other:?}"),
        ),
    };
    Some(response)
}

/// Run one tool; the flag marks failure.
async fn dispatch_tool(session: &mut Session, name: &str, args: &Value) -> (String, bool) {
    match call_tool(session, name, args).await {
        Ok(text) => (text, false),
        Err(e) => {
            tracing::debug!(tool = name, error = %e, "tool failed");
            (e.to_string(), true)
        }
    }
}

async fn call_tool(session: &mut Session, name: &str, args: &Value) -> Result<String> {
    match name {
        "lookin_connect" => {
            let port = match args.get("port") {
                Some(Value::Number(n)) => Some(
                    n.as_u64()
                        .filter(|p| *p <= u16::MAX as u64)
                        .map(|p| p as u16)
                        .ok_or_else(|| {
                            LookinError::ParseError("port must be a u16".into())
                        })?,
                ),
                Some(Value::Null) | None => None,
                Some(other) => {
                    return Err(LookinError::ParseError(format!(
                        "port must be a number, got {other}"
                    )))
                }
            };
            let port = session.connect(port).await?;
            Ok(format!("Connected to LookinServer on 127.0.0.1:{port}"))
        }
        "lookin_disconnect" => {
            session.disconnect();
            Ok("Disconnected".into())
        }
        "lookin_ping" => {
            let status = session.ping().await?;
            Ok(if status.app_is_in_background {
                "App is alive but in the background; UI requests may stall".into()
            } else {
                "App is alive and in the foreground".into()
            })
        }
        "lookin_app_info" => {
            let info = session.app_info().await?;
            Ok(render::render_app_info(&info))
        }
        "lookin_hierarchy" => {
            let refresh = args
                .get("refresh")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            let hierarchy = session.hierarchy(refresh).await?;
            let text_map = session.text_map().await.unwrap_or_default();
            Ok(render::render_hierarchy(&hierarchy, &text_map))
        }
        "lookin_view_detail" => {
            let oid = oid_arg(args, "oid")?;
            let groups = session.view_detail(oid).await?;
            Ok(render::render_detail(oid, &groups))
        }
        "lookin_search" => {
            let query = str_arg(args, "query")?;
            let hierarchy = session.hierarchy(false).await?;
            let text_map = session.text_map().await?;
            Ok(render::render_search(&query, &hierarchy, &text_map))
        }
        "lookin_subtree" => {
            let oid = oid_arg(args, "oid")?;
            let hierarchy = session.hierarchy(false).await?;
            let root = hierarchy.find_by_oid(oid).ok_or_else(|| {
                LookinError::ParseError(format!("no view or layer with oid {oid} in the hierarchy"))
            })?;
            let text_map = session.text_map().await.unwrap_or_default();
            Ok(render::render_subtree(root, &text_map))
        }
        "lookin_modify" => {
            let attribute = str_arg(args, "attribute")?;
            if attribute == attributes::HELP_NAME {
                return Ok(attributes::help_text());
            }
            let oid = oid_arg(args, "oid")?;
            let value = str_arg(args, "value")?;
            let (_detail, mapping) = session.modify(oid, &attribute, &value).await?;
            Ok(format!(
                "Set {} on oid {oid} via {}",
                mapping.name, mapping.setter
            ))
        }
        "lookin_invoke" => {
            let oid = oid_arg(args, "oid")?;
            let selector = str_arg(args, "selector")?;
            let outcome = session.invoke(oid, &selector).await?;
            Ok(render::render_invoke(&selector, &outcome))
        }
        "lookin_selectors" => {
            let class_name = str_arg(args, "class_name")?;
            let has_arg = args
                .get("has_arg")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let selectors = session.selectors(&class_name, has_arg).await?;
            if selectors.is_empty() {
                Ok(format!("No selectors reported for {class_name}"))
            } else {
                Ok(format!(
                    "{} selector(s) on {class_name}:\n{}",
                    selectors.len(),
                    selectors.join("\n")
                ))
            }
        }
        other => Err(LookinError::ParseError(format!("unknown tool {other:?}"))),
    }
}

fn str_arg(args: &Value, key: &str) -> Result<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LookinError::ParseError(format!("missing required argument {key:?}")))
}

/// OIDs are u64 and may exceed JSON's safe integer range, so both numbers
/// and (optionally hex) strings are accepted.
fn oid_arg(args: &Value, key: &str) -> Result<u64> {
    match args.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| LookinError::ParseError(format!("{key:?} must be a positive integer"))),
        Some(Value::String(s)) => {
            let s = s.trim();
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse::<u64>(),
            };
            parsed.map_err(|_| LookinError::ParseError(format!("{key:?} is not a valid oid: {s:?}")))
        }
        _ => Err(LookinError::ParseError(format!(
            "missing required argument {key:?}"
        ))),
    }
}

/// Static descriptions for `tools/list`.
fn tool_definitions() -> Vec<Value> {
    let oid_schema = json!({
        "type": ["integer", "string"],
        "description": "View or layer oid (decimal, or hex with 0x prefix)",
    });

    vec![
        json!({
            "name": "lookin_connect",
            "description": "Connect to LookinServer in the iOS Simulator. Probes ports 47164-47169 unless a port is given.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "port": { "type": "integer", "description": "Optional explicit port" },
                },
            },
        }),
        json!({
            "name": "lookin_disconnect",
            "description": "Drop the LookinServer connection and clear caches.",
            "inputSchema": { "type": "object", "properties": {} },
        }),
        json!({
            "name": "lookin_ping",
            "description": "Check that the app is alive and whether it is backgrounded.",
            "inputSchema": { "type": "object", "properties": {} },
        }),
        json!({
            "name": "lookin_app_info",
            "description": "App name, device, OS, and screen geometry.",
            "inputSchema": { "type": "object", "properties": {} },
        }),
        json!({
            "name": "lookin_hierarchy",
            "description": "The full view hierarchy as an indented tree with visible text.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "refresh": { "type": "boolean", "description": "Re-fetch instead of using the cache (default true)" },
                },
            },
        }),
        json!({
            "name": "lookin_view_detail",
            "description": "Every attribute group for one view/layer.",
            "inputSchema": {
                "type": "object",
                "properties": { "oid": oid_schema },
                "required": ["oid"],
            },
        }),
        json!({
            "name": "lookin_search",
            "description": "Find views by class name or visible text.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Case-insensitive substring" },
                },
                "required": ["query"],
            },
        }),
        json!({
            "name": "lookin_subtree",
            "description": "The hierarchy subtree rooted at one view.",
            "inputSchema": {
                "type": "object",
                "properties": { "oid": oid_schema },
                "required": ["oid"],
            },
        }),
        json!({
            "name": "lookin_modify",
            "description": "Set an attribute on a view or layer. Pass attribute=\"help\" to list supported attributes and value syntax.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "oid": oid_schema,
                    "attribute": { "type": "string", "description": "Friendly attribute name, e.g. hidden, backgroundColor" },
                    "value": { "type": "string", "description": "New value; syntax depends on the attribute" },
                },
                "required": ["attribute"],
            },
        }),
        json!({
            "name": "lookin_invoke",
            "description": "Invoke a zero-argument method on an object and describe the result.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "oid": oid_schema,
                    "selector": { "type": "string", "description": "Selector name, e.g. layoutIfNeeded" },
                },
                "required": ["oid", "selector"],
            },
        }),
        json!({
            "name": "lookin_selectors",
            "description": "List selector names for a class.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "class_name": { "type": "string" },
                    "has_arg": { "type": "boolean", "description": "Include selectors taking arguments (default false)" },
                },
                "required": ["class_name"],
            },
        }),
    ]
}
