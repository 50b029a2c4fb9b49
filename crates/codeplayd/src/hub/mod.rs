//! Broadcast hub using the actor pattern.
//!
//! The hub owns the connection registry and relays session events between
//! connections. Connection tasks talk to it through a `HubHandle`; the
//! actor queues pre-encoded lines on each connection's outbox.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  HubCommand   ┌──────────────┐  Arc<str> lines  ┌──────────────┐
//! │ Connection A │──────────────▶│   HubActor   │─────────────────▶│  Outbox A/B  │
//! │ Connection B │  (mpsc)       │  (registry)  │  (try_send)      │  writer task │
//! └──────────────┘               └──────────────┘                  └──────────────┘
//! ```
//!
//! Chat goes to everyone, the sender included. Language changes go to
//! everyone except the sender. A slow connection only fills its own queue.

use tokio::sync::{broadcast, mpsc};

use codeplay_core::LanguageId;

mod actor;
mod commands;
mod handle;
mod registry;

pub use actor::HubActor;
pub use commands::{HubCommand, HubError, HubEvent};
pub use handle::HubHandle;
pub use registry::{ConnectionRegistry, FanOutReport, Outbox, Recipient};

/// Default maximum number of simultaneous connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;

const COMMAND_BUFFER: usize = 1024;
const EVENT_BUFFER: usize = 256;

/// Hub settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Connections beyond this are rejected
    pub max_connections: usize,

    /// Replay the last announced language to each newcomer
    pub push_language_on_join: bool,

    /// Language the session starts with, if any
    pub initial_language: Option<LanguageId>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            push_language_on_join: true,
            initial_language: None,
        }
    }
}

/// Spawn the hub actor and return a handle for interaction.
///
/// The actor stops once every handle has been dropped.
pub fn spawn_hub(config: HubConfig) -> HubHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = HubActor::new(cmd_rx, event_tx.clone(), config);
    tokio::spawn(actor.run());

    HubHandle::new(cmd_tx, event_tx)
}
