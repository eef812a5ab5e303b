//! Transport module - port discovery and the single-socket connection.
//!
//! Provides:
//! - [`prober`] - concurrent liveness sweep over the LookinServer port range
//! - [`Connection`] - socket owner with a reader loop, serialized writes,
//!   and tag-correlated request/response dispatch

mod connection;
pub mod prober;

pub use connection::{Connection, ConnectionState, CONNECT_TIMEOUT};
pub use prober::{find_all, find_first, DEFAULT_PROBE_TIMEOUT, PORT_RANGE};
