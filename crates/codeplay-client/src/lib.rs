//! codeplay client - sync agent for a live coding session
//!
//! This library keeps one application instance in step with the hub:
//! it emits local chat and language changes, applies the ones it
//! receives, and reconnects on its own when the hub goes away.
//!
//! # Architecture
//!
//! `SyncClient::connect` spawns one connection task, which runs two loops
//! per connection:
//!
//! 1. **Reader**: decodes hub lines, updates [`SessionState`], and invokes
//!    subscribed handlers
//! 2. **Writer**: drains queued outbound events and sends keepalive pings
//!
//! When the connection drops, the task waits out an exponential backoff
//! and tries again. A `CancellationToken` stops everything on shutdown.

pub mod client;
pub mod config;
pub mod error;
pub mod listeners;
pub mod state;

// Re-export commonly used types
pub use client::SyncClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use listeners::{Listeners, Subscription};
pub use state::{ChatEntry, ConnectionStatus, SessionState};
