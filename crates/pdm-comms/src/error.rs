//! Comms errors

use pdm_protocol::{PendingKey, ProtocolError};
use thiserror::Error;

/// Adapter-level failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Adapter not connected")]
    NotConnected,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors surfaced by the comms pipeline
#[derive(Debug, Error)]
pub enum CommsError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The device never answered, distinct from a transport failure
    #[error("Request {key:?} failed after {retries} retries")]
    RequestFailed { key: PendingKey, retries: u32 },

    /// The pending entry was dropped before an outcome was known
    #[error("Request cancelled")]
    RequestCancelled,

    #[error("Pipeline not running")]
    NotRunning,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for comms operations
pub type CommsResult<T> = Result<T, CommsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pdm_protocol::MessagePrefix;

    #[test]
    fn test_request_failed_is_not_transport() {
        let err = CommsError::RequestFailed {
            key: PendingKey::new(200, MessagePrefix::Outputs, 3),
            retries: 3,
        };
        assert!(!matches!(err, CommsError::Transport(_)));
        assert!(err.to_string().contains("after 3 retries"));
    }

    #[test]
    fn test_transport_conversion() {
        let err: CommsError = TransportError::NotConnected.into();
        assert_eq!(err.to_string(), "Transport error: Adapter not connected");
    }
}
