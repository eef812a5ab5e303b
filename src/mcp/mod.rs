//! MCP module - the stdio-facing half of the bridge.
//!
//! Provides:
//! - [`serve_stdio`] - line-delimited JSON-RPC 2.0 loop over stdin/stdout
//! - [`protocol`] - JSON-RPC message types and builders
//! - [`render`] - tool-result text rendering

pub mod protocol;
pub mod render;
mod server;
mod stdio;

pub use server::serve_stdio;
pub use stdio::{write_stdout_json, write_stdout_line};
