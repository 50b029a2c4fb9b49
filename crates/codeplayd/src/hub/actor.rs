//! Hub actor - owns the connection registry and the session language.
//!
//! The actor is the single owner of hub state. Commands are processed one
//! at a time, which gives per-sender FIFO ordering for free: a connection's
//! reader enqueues its events in arrival order and the actor fans each one
//! out before looking at the next.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()`
//! - Reply and event send failures are ignored (the requester went away)
//! - Encoding failures are logged and the event is dropped

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use codeplay_core::{ConnectionId, LanguageId};
use codeplay_protocol::{encode_line, ServerMessage};

use super::commands::{HubCommand, HubError, HubEvent};
use super::registry::{ConnectionRegistry, FanOutReport, Outbox};
use super::HubConfig;

/// The hub actor.
///
/// # Ownership
///
/// - `registry`: every open connection and its outbox
/// - `language`: last language announced, replayed to newcomers
pub struct HubActor {
    receiver: mpsc::Receiver<HubCommand>,
    registry: ConnectionRegistry,
    language: Option<LanguageId>,
    config: HubConfig,
    event_publisher: broadcast::Sender<HubEvent>,
}

impl HubActor {
    pub fn new(
        receiver: mpsc::Receiver<HubCommand>,
        event_publisher: broadcast::Sender<HubEvent>,
        config: HubConfig,
    ) -> Self {
        Self {
            receiver,
            registry: ConnectionRegistry::new(),
            language: config.initial_language.clone(),
            config,
            event_publisher,
        }
    }

    /// Runs the actor loop until every handle is dropped.
    pub async fn run(mut self) {
        info!(
            max_connections = self.config.max_connections,
            "Hub actor starting"
        );

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(connections = self.registry.size(), "Hub actor stopped");
    }

    fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Connect {
                connection_id,
                outbox,
                respond_to,
            } => {
                let result = self.handle_connect(connection_id, outbox);
                let _ = respond_to.send(result);
            }
            HubCommand::Disconnect {
                connection_id,
                respond_to,
            } => {
                let removed = self.handle_disconnect(&connection_id);
                let _ = respond_to.send(removed);
            }
            HubCommand::Chat { sender, payload } => {
                self.handle_chat(sender, payload);
            }
            HubCommand::LanguageChange { sender, language } => {
                self.handle_language_change(sender, language);
            }
            HubCommand::Size { respond_to } => {
                let _ = respond_to.send(self.registry.size());
            }
            HubCommand::Contains {
                connection_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.registry.contains(&connection_id));
            }
            HubCommand::CurrentLanguage { respond_to } => {
                let _ = respond_to.send(self.language.clone());
            }
            HubCommand::CloseAll { respond_to } => {
                let closed = self.registry.clear();
                info!(closed, "Hub released all connections");
                let _ = respond_to.send(closed);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_connect(
        &mut self,
        connection_id: ConnectionId,
        outbox: Outbox,
    ) -> Result<usize, HubError> {
        if self.registry.contains(&connection_id) {
            debug!(connection_id = %connection_id, "Connection already registered");
            return Ok(self.registry.size());
        }

        if self.registry.size() >= self.config.max_connections {
            warn!(
                connection_id = %connection_id,
                max = self.config.max_connections,
                "Hub is full, rejecting connection"
            );
            return Err(HubError::Full {
                max: self.config.max_connections,
            });
        }

        // Snapshot goes in before the connection can see any broadcast.
        if self.config.push_language_on_join {
            if let Some(language) = &self.language {
                if let Some(line) = encode(&ServerMessage::language_change(language.clone())) {
                    if outbox.try_send(line).is_err() {
                        debug!(connection_id = %connection_id, "Could not queue language snapshot");
                    }
                }
            }
        }

        self.registry.register(connection_id.clone(), outbox);
        let total = self.registry.size();

        info!(connection_id = %connection_id, total, "Connection registered");
        let _ = self.event_publisher.send(HubEvent::Joined {
            connection_id,
            total,
        });

        Ok(total)
    }

    fn handle_disconnect(&mut self, connection_id: &ConnectionId) -> bool {
        let Some(recipient) = self.registry.unregister(connection_id) else {
            return false;
        };

        let total = self.registry.size();
        let lifetime = chrono::Utc::now() - recipient.connected_at;
        info!(
            connection_id = %connection_id,
            total,
            connected_secs = lifetime.num_seconds(),
            "Connection unregistered"
        );
        let _ = self.event_publisher.send(HubEvent::Left {
            connection_id: connection_id.clone(),
            total,
        });

        true
    }

    fn handle_chat(&mut self, sender: ConnectionId, payload: String) {
        if !self.registry.contains(&sender) {
            debug!(sender = %sender, "Ignoring chat from unregistered connection");
            return;
        }

        let Some(line) = encode(&ServerMessage::chat(payload)) else {
            return;
        };

        let report = self.registry.fan_out(&line, None);
        log_report("message", &sender, &report);

        let _ = self.event_publisher.send(HubEvent::ChatRelayed {
            sender,
            delivered: report.delivered,
            dropped: report.dropped_full + report.dropped_closed,
        });
    }

    fn handle_language_change(&mut self, sender: ConnectionId, language: LanguageId) {
        if !self.registry.contains(&sender) {
            debug!(sender = %sender, "Ignoring language change from unregistered connection");
            return;
        }

        self.language = Some(language.clone());

        let Some(line) = encode(&ServerMessage::language_change(language.clone())) else {
            return;
        };

        let report = self.registry.fan_out(&line, Some(&sender));
        log_report("language-change", &sender, &report);

        let _ = self
            .event_publisher
            .send(HubEvent::LanguageChanged { sender, language });
    }
}

/// Encodes a message once for every recipient to share.
fn encode(msg: &ServerMessage) -> Option<Arc<str>> {
    match encode_line(msg) {
        Ok(line) => Some(Arc::from(line)),
        Err(e) => {
            error!(error = %e, "Failed to encode broadcast");
            None
        }
    }
}

fn log_report(event: &str, sender: &ConnectionId, report: &FanOutReport) {
    debug!(
        event,
        sender = %sender,
        delivered = report.delivered,
        dropped_full = report.dropped_full,
        dropped_closed = report.dropped_closed,
        "Broadcast fanned out"
    );
}
