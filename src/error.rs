//! Error types for lookin-mcp.

use thiserror::Error;

/// Main error type for all bridge operations.
#[derive(Debug, Error)]
pub enum LookinError {
    /// No connection in the `Ready` state.
    #[error("not connected to LookinServer")]
    NotConnected,

    /// `connect` was called on a connection that already left `Idle`.
    #[error("already connected")]
    AlreadyConnected,

    /// Socket setup failed or the connect attempt was cancelled.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The deadline expired before the response frame arrived.
    #[error("request timed out")]
    Timeout,

    /// Socket write failure.
    #[error("send failed: {0}")]
    SendError(String),

    /// Socket read failure, EOF mid-frame, or a malformed header.
    #[error("read failed: {0}")]
    ReadError(String),

    /// Payload decode failed, wrong root type, or unexpected data shape.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The response envelope carried a non-null error; surfaced verbatim.
    #[error("server error: {0}")]
    ServerError(String),

    /// A user-supplied value could not be parsed for the attribute's type.
    #[error("{0}")]
    ParseError(String),

    /// The friendly attribute name is not in the registry.
    #[error("unknown attribute: {0:?} (use \"help\" to list supported attributes)")]
    UnknownAttribute(String),
}

impl LookinError {
    /// Whether this error means the underlying connection is gone or unusable.
    ///
    /// The session drops the connection and clears its caches when a
    /// transport-level error surfaces from ping or hierarchy operations, so
    /// the next tool call starts from `Idle`.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LookinError::NotConnected
                | LookinError::ConnectionFailed(_)
                | LookinError::Timeout
                | LookinError::SendError(_)
                | LookinError::ReadError(_)
        )
    }
}

/// Result type alias using LookinError.
pub type Result<T> = std::result::Result<T, LookinError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(LookinError::NotConnected.is_transport());
        assert!(LookinError::Timeout.is_transport());
        assert!(LookinError::SendError("broken pipe".into()).is_transport());
        assert!(LookinError::ReadError("eof".into()).is_transport());

        assert!(!LookinError::ServerError("no such oid".into()).is_transport());
        assert!(!LookinError::ParseError("bad color".into()).is_transport());
        assert!(!LookinError::UnknownAttribute("wat".into()).is_transport());
        assert!(!LookinError::InvalidFrame("bad root".into()).is_transport());
    }

    #[test]
    fn test_display_messages() {
        let err = LookinError::ServerError("view not found".into());
        assert_eq!(err.to_string(), "server error: view not found");

        let err = LookinError::UnknownAttribute("glow".into());
        assert!(err.to_string().contains("glow"));
        assert!(err.to_string().contains("help"));
    }
}
