//! codeplayd - session hub for live coding rooms
//!
//! - `hub` - broadcast hub actor owning the connection registry
//! - `server` - TCP listener and per-connection handlers
//! - `config` - daemon settings (defaults, TOML, environment)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        codeplayd                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │    HubServer    │────▶│          HubActor           │   │
//! │  │  (TcpListener)  │     │  (registry + language)      │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │ connections                 │ encoded lines     │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ConnectionHandler│◀────│  per-connection outbox      │   │
//! │  │ (reader+writer) │     │  (bounded mpsc)             │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//!   outside tests
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod hub;
pub mod server;

use tokio_util::sync::CancellationToken;

pub use config::{ConfigError, ServerConfig};
pub use hub::{spawn_hub, HubConfig, HubError, HubEvent, HubHandle};
pub use server::{ConnectionSettings, HubServer, ServerError};

/// Spawns a hub for `config` and binds a server in front of it.
///
/// The returned server has not started accepting yet; call `run`.
pub async fn bind_server(
    config: &ServerConfig,
    cancel_token: CancellationToken,
) -> Result<HubServer, ServerError> {
    let hub = spawn_hub(config.hub_config());
    HubServer::bind(
        &config.socket_addr(),
        hub,
        config.connection_settings(),
        cancel_token,
    )
    .await
}
