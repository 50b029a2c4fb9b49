//! Protocol versioning for safe upgrades.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::ProtocolError;

/// Protocol version for client-hub communication.
///
/// Sent by the client in every message and echoed by the hub in
/// `connected`/`rejected`, so either side can detect a mismatch.
/// Major bumps are breaking; minor bumps are additive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// Current protocol version.
    pub const CURRENT: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

    /// Creates a new ProtocolVersion.
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Returns true if this version can talk to `other` (same major).
    pub fn is_compatible_with(&self, other: &ProtocolVersion) -> bool {
        self.major == other.major
    }

    /// Returns true if this version is newer than another.
    pub fn is_newer_than(&self, other: &ProtocolVersion) -> bool {
        (self.major, self.minor) > (other.major, other.minor)
    }

    /// Checks a peer's version against [`ProtocolVersion::CURRENT`].
    pub fn check_peer(peer: ProtocolVersion) -> Result<(), ProtocolError> {
        if Self::CURRENT.is_compatible_with(&peer) {
            Ok(())
        } else {
            Err(ProtocolError::VersionMismatch {
                local: Self::CURRENT,
                peer,
            })
        }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
