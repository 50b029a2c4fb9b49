//! Error types for the client sync agent.
//!
//! None of these reach the application as hard failures: the connection
//! loop logs them and retries. They surface only as status changes.

use std::io;

use thiserror::Error;

use codeplay_protocol::{ProtocolError, ProtocolVersion};

/// Client sync agent errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// TCP connect failed.
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// TCP connect did not finish in time.
    #[error("Timed out connecting to {addr}")]
    ConnectTimeout { addr: String },

    /// The hub did not answer `connect` in time.
    #[error("Timed out waiting for handshake reply")]
    HandshakeTimeout,

    /// The hub refused the connection.
    #[error("Rejected by hub: {reason} (hub protocol {server_version})")]
    Rejected {
        reason: String,
        server_version: ProtocolVersion,
    },

    /// The hub answered `connect` with something other than a verdict.
    #[error("Unexpected {0} reply during handshake")]
    UnexpectedMessage(&'static str),

    /// Framing, parsing, version or socket failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The socket reader stopped abnormally.
    #[error("Reader task failed: {0}")]
    ReaderFailed(String),
}

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_display() {
        let error = ClientError::Connect {
            addr: "127.0.0.1:1".to_string(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        let display = error.to_string();
        assert!(display.contains("127.0.0.1:1"));
        assert!(display.contains("refused"));
    }

    #[test]
    fn test_rejected_display() {
        let error = ClientError::Rejected {
            reason: "Hub is full".to_string(),
            server_version: ProtocolVersion::new(1, 0),
        };
        assert_eq!(
            error.to_string(),
            "Rejected by hub: Hub is full (hub protocol 1.0)"
        );
    }

    #[test]
    fn test_protocol_error_is_transparent() {
        let error: ClientError = ProtocolError::Eof.into();
        assert_eq!(error.to_string(), ProtocolError::Eof.to_string());
    }
}
