//! TCP server for the codeplay hub.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Assigns each connection a `ConnectionId` and spawns a handler for it
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    HubServer    │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│    HubHandle    │
//! │ (per connection)│     │                 │
//! └───────▲─────────┘     └───────┬─────────┘
//!         │ writer task           │ outbox (try_send)
//!         └───────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and the loop keeps going
//! - A handler that panics is still unregistered from the hub

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, ConnectionSettings};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use codeplay_core::ConnectionId;

use crate::hub::HubHandle;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 3000;

/// TCP server accepting session connections.
pub struct HubServer {
    listener: TcpListener,
    hub: HubHandle,
    settings: ConnectionSettings,
    cancel_token: CancellationToken,

    /// Source of connection ids; ids are never reused within a run
    connection_counter: AtomicU64,
}

impl HubServer {
    /// Binds the listening socket.
    ///
    /// Binding is separate from [`HubServer::run`] so callers (tests in
    /// particular) can bind port 0 and read the real address back.
    pub async fn bind(
        addr: &str,
        hub: HubHandle,
        settings: ConnectionSettings,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_string(),
                error: e.to_string(),
            })?;

        Ok(Self {
            listener,
            hub,
            settings,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Returns the address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Accepts connections until the cancellation token fires.
    ///
    /// On shutdown every registration is released so no further broadcast
    /// is queued; handlers see the same token and close their sockets.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.local_addr()?;
        info!(addr = %addr, "Hub server listening");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.handle_connection(stream, peer),
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        let released = self.hub.close_all().await;
        info!(released, "Server stopped");
        Ok(())
    }

    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let sequence = self.connection_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let connection_id = ConnectionId::from_sequence(sequence);

        if let Err(e) = stream.set_nodelay(true) {
            debug!(connection_id = %connection_id, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let handler = ConnectionHandler::new(
            reader,
            connection_id.clone(),
            peer,
            self.hub.clone(),
            self.settings.clone(),
            self.cancel_token.child_token(),
        );
        let hub = self.hub.clone();

        tokio::spawn(async move {
            let task = tokio::spawn(handler.run(writer));
            if let Err(e) = task.await {
                // The handler never reached its own cleanup.
                error!(connection_id = %connection_id, error = %e, "Connection task failed");
                hub.on_disconnect(connection_id).await;
            }
        });
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("Failed to read local address: {0}")]
    LocalAddr(std::io::Error),
}
