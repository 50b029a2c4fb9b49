//! Connection identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix for server-assigned connection identifiers.
pub const CONNECTION_ID_PREFIX: &str = "conn-";

/// Opaque identifier for one live transport session.
///
/// Assigned by the server when a connection is accepted. A client that
/// reconnects always receives a fresh identifier; nothing carries over
/// between transport sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Creates a ConnectionId from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates the identifier for the `n`th accepted connection.
    pub fn from_sequence(n: u64) -> Self {
        Self(format!("{CONNECTION_ID_PREFIX}{n}"))
    }

    /// Returns the accept sequence number, if this id was server-assigned.
    pub fn sequence(&self) -> Option<u64> {
        self.0
            .strip_prefix(CONNECTION_ID_PREFIX)
            .and_then(|s| s.parse().ok())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
