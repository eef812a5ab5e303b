//! Stdio I/O for the MCP transport.
//!
//! The MCP plane is line-delimited JSON-RPC over stdio:
//!
//! - **stdout**: JSON-RPC messages, one per line, nothing else
//! - **stderr**: logs and diagnostics (not parsed by the host)
//! - **Never use `println!`**: it may emit `\r\n` on Windows

use std::io::Write;

/// Write a line to stdout followed by a single `\n`, then flush.
///
/// The host reads one message per line and waits for the flush, so partial
/// writes would wedge the whole conversation.
pub fn write_stdout_line(line: &str) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(line.as_bytes())?;
    handle.write_all(b"\n")?;
    handle.flush()?;
    Ok(())
}

/// Serialize a JSON value and write it as a single stdout line.
pub fn write_stdout_json(value: &serde_json::Value) -> std::io::Result<()> {
    let json = serde_json::to_string(value)?;
    write_stdout_line(&json)
}
