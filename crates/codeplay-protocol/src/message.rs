//! Protocol message types for hub communication.
//!
//! Session events travel under the same names in both directions:
//! `message` for chat and `language-change` for the selected language,
//! each carrying a single string `payload`.

use crate::version::ProtocolVersion;
use codeplay_core::{ConnectionId, LanguageId};
use serde::{Deserialize, Serialize};

/// Message types that can be sent by clients to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageType {
    /// Client handshake/connection request
    Connect {
        /// Human-readable client name for server logs (optional)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_name: Option<String>,
    },

    /// Chat message for every participant, the sender included
    Message {
        /// Chat text, forwarded verbatim
        payload: String,
    },

    /// Language selection for every participant except the sender
    #[serde(rename = "language-change")]
    LanguageChange {
        /// Language identifier, forwarded verbatim
        payload: LanguageId,
    },

    /// Ping to check connection
    Ping {
        /// Sequence number for matching pong response
        seq: u64,
    },

    /// Client disconnecting gracefully
    Disconnect,
}

impl MessageType {
    /// Returns the wire name of this message type, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Message { .. } => "message",
            Self::LanguageChange { .. } => "language-change",
            Self::Ping { .. } => "ping",
            Self::Disconnect => "disconnect",
        }
    }
}

/// Messages sent from client to hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Protocol version
    pub protocol_version: ProtocolVersion,

    /// Message payload
    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    /// Creates a new client message with current protocol version.
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    /// Creates a connect message.
    pub fn connect(client_name: Option<String>) -> Self {
        Self::new(MessageType::Connect { client_name })
    }

    /// Creates a chat message.
    pub fn chat(payload: impl Into<String>) -> Self {
        Self::new(MessageType::Message {
            payload: payload.into(),
        })
    }

    /// Creates a language change message.
    pub fn language_change(payload: LanguageId) -> Self {
        Self::new(MessageType::LanguageChange { payload })
    }

    /// Creates a ping message.
    pub fn ping(seq: u64) -> Self {
        Self::new(MessageType::Ping { seq })
    }

    /// Creates a disconnect message.
    pub fn disconnect() -> Self {
        Self::new(MessageType::Disconnect)
    }
}

/// Messages sent from the hub to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection accepted
    Connected {
        /// Hub's protocol version
        protocol_version: ProtocolVersion,
        /// Identifier assigned to this connection
        connection_id: ConnectionId,
    },

    /// Connection rejected (version mismatch, hub full)
    Rejected {
        /// Reason for rejection
        reason: String,
        /// Hub's protocol version (for client to upgrade)
        protocol_version: ProtocolVersion,
    },

    /// Chat message from any participant
    Message {
        /// Chat text exactly as the sender emitted it
        payload: String,
    },

    /// Another participant selected a language
    #[serde(rename = "language-change")]
    LanguageChange {
        /// Language identifier exactly as the sender emitted it
        payload: LanguageId,
    },

    /// Pong response to ping
    Pong {
        /// Sequence number from ping
        seq: u64,
    },

    /// Error response
    Error {
        /// Error message
        message: String,
        /// Error code (optional)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ServerMessage {
    /// Creates a connected response.
    pub fn connected(connection_id: ConnectionId) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            connection_id,
        }
    }

    /// Creates a rejected response.
    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    /// Creates a chat broadcast.
    pub fn chat(payload: impl Into<String>) -> Self {
        Self::Message {
            payload: payload.into(),
        }
    }

    /// Creates a language change broadcast.
    pub fn language_change(payload: LanguageId) -> Self {
        Self::LanguageChange { payload }
    }

    /// Creates a pong response.
    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }

    /// Creates an error response.
    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    /// Creates an error response with code.
    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }
}

/// Error codes carried in [`ServerMessage::Error`].
pub mod error_code {
    /// The line could not be parsed as a client message.
    pub const MALFORMED: &str = "malformed";
    /// The line exceeded the protocol size limit.
    pub const TOO_LARGE: &str = "too_large";
    /// A second `connect` arrived on an established connection.
    pub const ALREADY_CONNECTED: &str = "already_connected";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_uses_message_event_name() {
        let json = serde_json::to_string(&ClientMessage::chat("hello")).unwrap();
        assert!(json.contains("\"type\":\"message\""));
        assert!(json.contains("\"payload\":\"hello\""));
        assert!(json.contains("\"protocol_version\""));
    }

    #[test]
    fn test_language_change_uses_hyphenated_event_name() {
        let msg = ServerMessage::language_change(LanguageId::new("python"));
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"language-change","payload":"python"}"#);
    }

    #[test]
    fn test_parse_client_language_change() {
        let line = r#"{"protocol_version":{"major":1,"minor":0},"type":"language-change","payload":"not-a-real-language"}"#;
        let parsed: ClientMessage = serde_json::from_str(line).unwrap();
        assert_eq!(
            parsed.message,
            MessageType::LanguageChange {
                payload: LanguageId::new("not-a-real-language")
            }
        );
    }

    #[test]
    fn test_connect_without_name_omits_field() {
        let json = serde_json::to_string(&ClientMessage::connect(None)).unwrap();
        assert!(json.contains("\"type\":\"connect\""));
        assert!(!json.contains("client_name"));
    }

    #[test]
    fn test_connected_carries_connection_id() {
        let msg = ServerMessage::connected(ConnectionId::from_sequence(3));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"connected\""));
        assert!(json.contains("\"connection_id\":\"conn-3\""));
    }

    #[test]
    fn test_payload_is_not_altered() {
        let text = "  spaced  \u{1F600} \"quoted\" ";
        let json = serde_json::to_string(&ServerMessage::chat(text)).unwrap();
        match serde_json::from_str::<ServerMessage>(&json).unwrap() {
            ServerMessage::Message { payload } => assert_eq!(payload, text),
            other => panic!("Expected Message, got {other:?}"),
        }
    }

    #[test]
    fn test_message_type_names() {
        assert_eq!(ClientMessage::ping(1).message.name(), "ping");
        assert_eq!(
            ClientMessage::language_change(LanguageId::new("go")).message.name(),
            "language-change"
        );
    }
}
