//! Client sync agent configuration.

use std::time::Duration;

use codeplay_core::LanguageId;

/// Environment variable the terminal client reads the hub address from.
pub const ENV_ADDR: &str = "CODEPLAY_ADDR";

/// Default hub address.
pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";

/// Configuration for the sync client.
///
/// # Example
///
/// ```rust
/// use codeplay_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     addr: "10.0.0.5:3000".to_string(),
///     retry_initial_delay: Duration::from_millis(250),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Hub address (`host:port`).
    pub addr: String,

    /// Name sent in the handshake; shows up in hub logs only.
    pub client_name: Option<String>,

    /// Delay before the first retry after a failed attempt.
    pub retry_initial_delay: Duration,

    /// Upper bound for the retry delay. Retries themselves never stop.
    pub retry_max_delay: Duration,

    /// Backoff growth factor (2.0 doubles the delay each retry).
    pub retry_multiplier: f64,

    /// Limit for one TCP connect attempt, and for the handshake reply.
    pub connect_timeout: Duration,

    /// Keepalive period while connected.
    pub ping_interval: Duration,

    /// Outgoing events that may wait for the socket before sends fail.
    pub outbound_capacity: usize,

    /// Language shown before any change is received.
    pub initial_language: LanguageId,

    /// Received chat messages kept in the local transcript.
    pub chat_history_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            client_name: None,
            retry_initial_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            retry_multiplier: 2.0,
            connect_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
            outbound_capacity: 64,
            initial_language: LanguageId::default(),
            chat_history_limit: 500,
        }
    }
}
