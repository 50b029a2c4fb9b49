//! Client interface for interacting with the HubActor.
//!
//! `HubHandle` is cheap to clone; every connection task holds one.
//! Channel errors map to `HubError::ChannelClosed` or a neutral default,
//! never a panic.

use tokio::sync::{broadcast, mpsc, oneshot};

use codeplay_core::{ConnectionId, LanguageId};

use super::commands::{HubCommand, HubError, HubEvent};
use super::registry::Outbox;

/// Handle for interacting with the hub actor.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
    event_sender: broadcast::Sender<HubEvent>,
}

impl HubHandle {
    pub fn new(sender: mpsc::Sender<HubCommand>, event_sender: broadcast::Sender<HubEvent>) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Registers a connection that completed its handshake.
    ///
    /// If a language has been announced (and snapshots are enabled) it is
    /// queued on `outbox` before any broadcast can reach it. Registering an
    /// id twice is a no-op.
    ///
    /// Returns the number of connections after registration.
    ///
    /// # Errors
    ///
    /// - `HubError::Full` if the hub is at capacity
    /// - `HubError::ChannelClosed` if the actor has shut down
    pub async fn on_connect(
        &self,
        connection_id: ConnectionId,
        outbox: Outbox,
    ) -> Result<usize, HubError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(HubCommand::Connect {
                connection_id,
                outbox,
                respond_to: tx,
            })
            .await
            .map_err(|_| HubError::ChannelClosed)?;

        rx.await.map_err(|_| HubError::ChannelClosed)?
    }

    /// Unregisters a connection. Safe to call any number of times.
    ///
    /// Returns true if the connection was registered. Once this returns,
    /// no further broadcast is queued for the connection.
    pub async fn on_disconnect(&self, connection_id: ConnectionId) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(HubCommand::Disconnect {
                connection_id,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// Relays chat text to every connection, the sender included.
    ///
    /// The payload is forwarded verbatim.
    ///
    /// # Errors
    ///
    /// - `HubError::ChannelClosed` if the actor has shut down
    pub async fn on_chat_message(
        &self,
        sender: ConnectionId,
        payload: String,
    ) -> Result<(), HubError> {
        self.sender
            .send(HubCommand::Chat { sender, payload })
            .await
            .map_err(|_| HubError::ChannelClosed)
    }

    /// Relays a language selection to every connection except the sender,
    /// and records it as the session language.
    ///
    /// # Errors
    ///
    /// - `HubError::ChannelClosed` if the actor has shut down
    pub async fn on_language_change(
        &self,
        sender: ConnectionId,
        language: LanguageId,
    ) -> Result<(), HubError> {
        self.sender
            .send(HubCommand::LanguageChange { sender, language })
            .await
            .map_err(|_| HubError::ChannelClosed)
    }

    /// Number of registered connections (0 if the actor is gone).
    pub async fn size(&self) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(HubCommand::Size { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or(0)
    }

    pub async fn contains(&self, connection_id: ConnectionId) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(HubCommand::Contains {
                connection_id,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// Last language announced in the session.
    pub async fn current_language(&self) -> Option<LanguageId> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(HubCommand::CurrentLanguage { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Releases every registration. Returns how many were dropped.
    pub async fn close_all(&self) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(HubCommand::CloseAll { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or(0)
    }

    /// Subscribe to hub events.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.event_sender.subscribe()
    }

    /// Returns true while the actor is accepting commands.
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}
