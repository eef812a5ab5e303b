//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.

use bytes::Bytes;

use super::wire_format::{Header, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the frame type code.
    #[inline]
    pub fn frame_type(&self) -> u32 {
        self.header.frame_type
    }

    /// Get the correlation tag.
    #[inline]
    pub fn tag(&self) -> u32 {
        self.header.tag
    }
}

/// Build a complete frame as a single byte vector.
///
/// Encodes the header and appends the payload into one contiguous buffer so
/// the transport can hand it to the socket as a single write.
pub fn build_frame(frame_type: u32, tag: u32, payload: &[u8]) -> Vec<u8> {
    let header = Header::new(frame_type, tag, payload.len() as u32);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire_format::request_types;

    #[test]
    fn test_frame_creation() {
        let header = Header::new(request_types::PING, 42, 5);
        let payload = Bytes::from_static(b"hello");
        let frame = Frame::new(header, payload);

        assert_eq!(frame.frame_type(), request_types::PING);
        assert_eq!(frame.tag(), 42);
        assert_eq!(frame.payload(), b"hello");
        assert_eq!(frame.payload_len(), 5);
    }

    #[test]
    fn test_frame_empty_payload() {
        let header = Header::new(request_types::PING, 1, 0);
        let frame = Frame::new(header, Bytes::new());

        assert_eq!(frame.payload_len(), 0);
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_build_frame() {
        let bytes = build_frame(request_types::HIERARCHY, 42, b"hello");

        assert_eq!(bytes.len(), HEADER_SIZE + 5);

        let parsed = Header::decode(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(parsed.frame_type, request_types::HIERARCHY);
        assert_eq!(parsed.tag, 42);
        assert_eq!(parsed.payload_length, 5);
        assert_eq!(&bytes[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_build_frame_empty_payload() {
        let bytes = build_frame(request_types::PING, 1, b"");
        assert_eq!(bytes.len(), HEADER_SIZE);
    }

    #[test]
    fn test_build_frame_roundtrip() {
        use super::super::FrameBuffer;

        let payload = b"0123456789";
        let bytes = build_frame(request_types::ALL_ATTR_GROUPS, 456, payload);

        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&bytes).unwrap();

        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.frame_type(), request_types::ALL_ATTR_GROUPS);
        assert_eq!(frame.tag(), 456);
        assert_eq!(frame.payload(), payload);
    }
}
