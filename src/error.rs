//! Error types for session operations

use serde::{Deserialize, Serialize};

use crate::codec::CodecError;
use crate::transport::TransportError;

/// Result type alias using SessionError
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced synchronously by session operations
///
/// Asynchronous failures (handshake errors, socket drops, bridge loss)
/// never appear here; they arrive as transport events and show up in the
/// message log and connection state instead.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", content = "message", rename_all = "lowercase")]
pub enum SessionError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        SessionError::Transport(err.to_string())
    }
}

impl From<CodecError> for SessionError {
    fn from(err: CodecError) -> Self {
        SessionError::InvalidPayload(err.to_string())
    }
}

impl From<SessionError> for String {
    fn from(err: SessionError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SessionError::Validation("URL must not be empty".to_string());
        assert_eq!(err.to_string(), "Validation error: URL must not be empty");

        let err = SessionError::NotConnected;
        assert_eq!(err.to_string(), "Not connected");
    }

    #[test]
    fn test_error_to_string_conversion() {
        let err = SessionError::InvalidPayload("bad hex".to_string());
        let s: String = err.into();
        assert_eq!(s, "Invalid payload: bad hex");
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: SessionError = TransportError::NotOpen.into();
        assert!(matches!(err, SessionError::Transport(_)));
    }

    #[test]
    fn test_error_serialization() {
        let err = SessionError::NotConnected;
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("notconnected"));
    }
}
