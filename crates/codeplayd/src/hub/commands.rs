//! Hub actor commands, errors, and events.
//!
//! - `HubCommand`: requests sent to the actor
//! - `HubError`: failures surfaced to the connection layer
//! - `HubEvent`: membership/session changes published for observers

use codeplay_core::{ConnectionId, LanguageId};
use thiserror::Error;
use tokio::sync::oneshot;

use super::registry::Outbox;

// ============================================================================
// Hub Commands
// ============================================================================

/// Commands sent to the hub actor.
///
/// Membership changes carry a oneshot so the connection layer knows the
/// registry reflects them before it moves on. Session events are
/// fire-and-forget: the per-connection reader never waits on delivery.
#[derive(Debug)]
pub enum HubCommand {
    /// A connection completed its handshake.
    ///
    /// # Errors
    /// - `HubError::Full` if the hub is at maximum capacity
    Connect {
        connection_id: ConnectionId,
        /// Queue the connection's writer drains
        outbox: Outbox,
        /// Replies with the number of connections after registration
        respond_to: oneshot::Sender<Result<usize, HubError>>,
    },

    /// A connection ended, for whatever reason.
    Disconnect {
        connection_id: ConnectionId,
        /// Replies true if the connection was registered
        respond_to: oneshot::Sender<bool>,
    },

    /// Chat text to deliver to every connection, the sender included.
    Chat {
        sender: ConnectionId,
        payload: String,
    },

    /// Language selection to deliver to every connection except the sender.
    LanguageChange {
        sender: ConnectionId,
        language: LanguageId,
    },

    /// Number of registered connections.
    Size { respond_to: oneshot::Sender<usize> },

    /// Whether a connection is registered.
    Contains {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Last language announced in the session, if any.
    CurrentLanguage {
        respond_to: oneshot::Sender<Option<LanguageId>>,
    },

    /// Drop every registration (server shutdown).
    ///
    /// Releasing the outboxes lets each writer drain what is queued and stop.
    CloseAll { respond_to: oneshot::Sender<usize> },
}

// ============================================================================
// Hub Errors
// ============================================================================

/// Errors that can occur during hub operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HubError {
    /// Hub is at maximum connection capacity.
    #[error("Hub is full (max: {max} connections)")]
    Full { max: usize },

    /// Actor channel closed (hub shut down).
    #[error("Hub channel closed")]
    ChannelClosed,
}

// ============================================================================
// Hub Events
// ============================================================================

/// Events published by the hub.
///
/// Observers get these through `HubHandle::subscribe`. They carry no
/// payload text, only what changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    /// A connection joined the session.
    Joined {
        connection_id: ConnectionId,
        total: usize,
    },

    /// A connection left the session.
    Left {
        connection_id: ConnectionId,
        total: usize,
    },

    /// A chat message was fanned out.
    ChatRelayed {
        sender: ConnectionId,
        delivered: usize,
        dropped: usize,
    },

    /// The session language changed.
    LanguageChanged {
        sender: ConnectionId,
        language: LanguageId,
    },
}

impl HubEvent {
    /// Returns the connection this event concerns.
    pub fn connection_id(&self) -> &ConnectionId {
        match self {
            Self::Joined { connection_id, .. } | Self::Left { connection_id, .. } => {
                connection_id
            }
            Self::ChatRelayed { sender, .. } | Self::LanguageChanged { sender, .. } => sender,
        }
    }
}
