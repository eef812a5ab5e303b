//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the binary protocol spoken with LookinServer:
//! - 16-byte header encoding/decoding (all fields big-endian)
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    request_types, Header, HEADER_SIZE, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION, RESERVED_TAG,
};
