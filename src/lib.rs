//! # lookin-mcp
//!
//! MCP bridge exposing the live UI view hierarchy of an iOS Simulator app
//! to AI assistants. Assistants speak line-delimited JSON-RPC over stdio;
//! the bridge translates tool calls into requests on the binary TCP
//! protocol served by the in-app LookinServer agent on loopback.
//!
//! ## Architecture
//!
//! - **Control plane** (stdio): MCP JSON-RPC, one message per line
//! - **Data plane** (TCP): tag-multiplexed, length-prefixed frames carrying
//!   keyed-archive payloads
//!
//! ## Example
//!
//! ```ignore
//! use lookin_mcp::session::Session;
//!
//! #[tokio::main]
//! async fn main() -> lookin_mcp::Result<()> {
//!     let mut session = Session::new();
//!     let port = session.connect(None).await?; // probes 47164-47169
//!     println!("connected on {port}");
//!
//!     let hierarchy = session.hierarchy(true).await?;
//!     println!("{} root items", hierarchy.display_items.len());
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod attributes;
pub mod error;
pub mod mcp;
pub mod protocol;
pub mod requests;
pub mod session;
pub mod transport;

pub use error::{LookinError, Result};
pub use session::Session;
