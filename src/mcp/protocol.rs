//! JSON-RPC 2.0 message types for the MCP plane.

use serde::Deserialize;
use serde_json::{json, Value};

/// MCP protocol revision implemented by this server.
pub const PROTOCOL_REVISION: &str = "2024-11-05";

/// Standard JSON-RPC error codes used here.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
}

/// An incoming JSON-RPC request or notification.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    /// Notifications carry no id and never get a response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Build a success response.
pub fn success(id: &Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

/// Build an error response.
pub fn error(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message,
        },
    })
}

/// Build a `tools/call` result: one text content block, with the error flag
/// set on the envelope when the tool failed.
pub fn tool_text(text: &str, is_error: bool) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": text,
        }],
        "isError": is_error,
    })
}
