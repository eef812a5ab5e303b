//! Wire format encoding and decoding.
//!
//! Implements the 16-byte header of the LookinServer (Peertalk-derived)
//! protocol:
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────┐
//! │ Version  │ Type     │ Tag      │ Length   │
//! │ 4 bytes  │ 4 bytes  │ 4 bytes  │ 4 bytes  │
//! │ uint32 BE│ uint32 BE│ uint32 BE│ uint32 BE│
//! └──────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! All fields are Big Endian. `Version` is always 1; anything else on the
//! read path is a protocol violation that tears the connection down.

use crate::error::{LookinError, Result};

/// Header size in bytes (fixed, exactly 16).
pub const HEADER_SIZE: usize = 16;

/// Protocol version carried in every header.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum payload size accepted from the server (64 MiB).
///
/// Hierarchy payloads with screenshots run to a few megabytes; anything
/// beyond this indicates a desynchronized stream.
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Tag value reserved by the protocol; the client never issues it.
pub const RESERVED_TAG: u32 = 0;

/// Request type codes understood by LookinServer.
pub mod request_types {
    /// Liveness check; response envelope carries `appIsInBackground`.
    pub const PING: u32 = 200;
    /// Fetch app metadata (name, device, screen geometry).
    pub const APP: u32 = 201;
    /// Fetch the full display-item hierarchy.
    pub const HIERARCHY: u32 = 202;
    /// Modify an inbuilt attribute on a view or layer.
    pub const INBUILT_ATTR_MODIFICATION: u32 = 204;
    /// Invoke a zero-argument method on an object.
    pub const INVOKE_METHOD: u32 = 206;
    /// Fetch every attribute group for a layer.
    pub const ALL_ATTR_GROUPS: u32 = 210;
    /// List selector names for a class.
    pub const ALL_SELECTOR_NAMES: u32 = 213;
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version (must be [`PROTOCOL_VERSION`]).
    pub version: u32,
    /// Request/response type code (see [`request_types`]).
    pub frame_type: u32,
    /// Correlation tag pairing a response with its request.
    pub tag: u32,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header with the current protocol version.
    pub fn new(frame_type: u32, tag: u32, payload_length: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            frame_type,
            tag,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.version.to_be_bytes());
        buf[4..8].copy_from_slice(&self.frame_type.to_be_bytes());
        buf[8..12].copy_from_slice(&self.tag.to_be_bytes());
        buf[12..16].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if the buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            version: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            frame_type: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            tag: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            payload_length: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks the version constant and the payload size bound. Either
    /// violation means the byte stream is no longer trustworthy.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.version != PROTOCOL_VERSION {
            return Err(LookinError::ReadError(format!(
                "unsupported protocol version {} (expected {})",
                self.version, PROTOCOL_VERSION
            )));
        }

        if self.payload_length > max_payload_size {
            return Err(LookinError::ReadError(format!(
                "payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(request_types::HIERARCHY, 42, 100);
        let encoded = original.encode();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
        assert_eq!(decoded.version, PROTOCOL_VERSION);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header {
            version: 0x01020304,
            frame_type: 0x05060708,
            tag: 0x090A0B0C,
            payload_length: 0x0D0E0F10,
        };
        let bytes = header.encode();

        assert_eq!(&bytes[0..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[4..8], &[0x05, 0x06, 0x07, 0x08]);
        assert_eq!(&bytes[8..12], &[0x09, 0x0A, 0x0B, 0x0C]);
        assert_eq!(&bytes[12..16], &[0x0D, 0x0E, 0x0F, 0x10]);
    }

    #[test]
    fn test_header_size_is_exactly_16() {
        assert_eq!(HEADER_SIZE, 16);
        let header = Header::new(request_types::PING, 1, 0);
        assert_eq!(header.encode().len(), 16);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; 15]; // One byte short
        assert!(Header::decode(&buf).is_none());
    }

    #[test]
    fn test_validate_wrong_version_rejected() {
        let mut header = Header::new(request_types::PING, 1, 0);
        header.version = 2;
        let result = header.validate(MAX_PAYLOAD_SIZE);
        assert!(matches!(result, Err(LookinError::ReadError(_))));
        assert!(result.unwrap_err().to_string().contains("version"));
    }

    #[test]
    fn test_validate_version_zero_rejected() {
        let mut header = Header::new(request_types::PING, 1, 0);
        header.version = 0;
        assert!(header.validate(MAX_PAYLOAD_SIZE).is_err());
    }

    #[test]
    fn test_validate_payload_too_large() {
        let header = Header::new(request_types::HIERARCHY, 1, 1_000_000);
        let result = header.validate(100); // Max 100 bytes
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_validate_accepts_empty_payload() {
        let header = Header::new(request_types::PING, 7, 0);
        assert!(header.validate(MAX_PAYLOAD_SIZE).is_ok());
    }

    #[test]
    fn test_request_type_codes() {
        assert_eq!(request_types::PING, 200);
        assert_eq!(request_types::APP, 201);
        assert_eq!(request_types::HIERARCHY, 202);
        assert_eq!(request_types::INBUILT_ATTR_MODIFICATION, 204);
        assert_eq!(request_types::INVOKE_METHOD, 206);
        assert_eq!(request_types::ALL_ATTR_GROUPS, 210);
        assert_eq!(request_types::ALL_SELECTOR_NAMES, 213);
    }

    #[test]
    fn test_max_tag_roundtrip() {
        let header = Header::new(request_types::PING, u32::MAX, u32::MAX);
        let decoded = Header::decode(&header.encode()).unwrap();
        assert_eq!(decoded.tag, u32::MAX);
        assert_eq!(decoded.payload_length, u32::MAX);
    }
}
