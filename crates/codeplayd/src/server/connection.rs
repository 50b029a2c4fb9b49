//! Per-connection handler.
//!
//! Each accepted socket gets a `ConnectionHandler` that:
//! - performs the `connect` handshake and version check
//! - registers an outbox with the hub
//! - hands the write half to a writer task draining that outbox
//! - relays incoming session events to the hub until the peer leaves
//!
//! Replies (pong, errors) go through the same outbox as broadcasts, so a
//! connection sees one ordered stream of lines.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and end in an orderly disconnect

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use codeplay_core::ConnectionId;
use codeplay_protocol::{
    decode_line, encode_line, error_code, read_line, write_line, write_message, ClientMessage,
    MessageType, ProtocolError, ProtocolVersion, ServerMessage,
};

use crate::hub::{HubError, HubHandle, Outbox};

/// Per-connection limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Lines that may wait in a connection's outbox before deliveries drop
    pub outbox_capacity: usize,

    /// A connection silent for this long is closed
    pub idle_timeout: Duration,

    /// A single line taking longer than this to write closes the connection
    pub write_timeout: Duration,

    /// Time allowed between accept and the `connect` message
    pub handshake_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            outbox_capacity: 256,
            idle_timeout: Duration::from_secs(120),
            write_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Handler for a single client connection.
pub struct ConnectionHandler {
    reader: BufReader<OwnedReadHalf>,
    line: String,
    connection_id: ConnectionId,
    peer: SocketAddr,
    hub: HubHandle,
    settings: ConnectionSettings,
    cancel_token: CancellationToken,
    client_name: Option<String>,
}

impl ConnectionHandler {
    pub fn new(
        reader: OwnedReadHalf,
        connection_id: ConnectionId,
        peer: SocketAddr,
        hub: HubHandle,
        settings: ConnectionSettings,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: String::new(),
            connection_id,
            peer,
            hub,
            settings,
            cancel_token,
            client_name: None,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Runs the connection to completion and returns its id.
    ///
    /// Whatever ends the connection, the hub is told about it before this
    /// returns.
    pub async fn run(mut self, writer: OwnedWriteHalf) -> ConnectionId {
        let mut writer = BufWriter::new(writer);
        debug!(connection_id = %self.connection_id, peer = %self.peer, "New connection");

        match self.handle_handshake(&mut writer).await {
            Ok(()) => {}
            Err(e) => {
                warn!(
                    connection_id = %self.connection_id,
                    peer = %self.peer,
                    error = %e,
                    "Handshake failed"
                );
                return self.connection_id;
            }
        }

        let (outbox, outbox_rx) = mpsc::channel(self.settings.outbox_capacity.max(1));

        // `connected` has to be the first line, ahead of any language
        // snapshot the hub queues during registration.
        if let Err(e) = enqueue(&outbox, &ServerMessage::connected(self.connection_id.clone())) {
            warn!(connection_id = %self.connection_id, error = %e, "Failed to queue handshake reply");
            return self.connection_id;
        }

        match self.hub.on_connect(self.connection_id.clone(), outbox.clone()).await {
            Ok(total) => {
                info!(
                    connection_id = %self.connection_id,
                    client_name = ?self.client_name,
                    peer = %self.peer,
                    total,
                    "Client connected"
                );
            }
            Err(e) => {
                warn!(connection_id = %self.connection_id, error = %e, "Hub refused connection");
                let reply = ServerMessage::rejected(&e.to_string());
                let _ = timeout(
                    self.settings.write_timeout,
                    write_message(&mut writer, &reply),
                )
                .await;
                return self.connection_id;
            }
        }

        let mut writer_task = tokio::spawn(write_outbox(
            writer,
            outbox_rx,
            self.settings.write_timeout,
        ));

        if let Err(e) = self.process_messages(&outbox, &mut writer_task).await {
            debug!(connection_id = %self.connection_id, error = %e, "Connection closed");
        }

        self.hub.on_disconnect(self.connection_id.clone()).await;
        writer_task.abort();

        info!(connection_id = %self.connection_id, "Client disconnected");
        self.connection_id
    }

    /// Expects `connect` as the first line and checks the protocol version.
    ///
    /// Rejections are written straight to the socket: no outbox exists yet.
    async fn handle_handshake(
        &mut self,
        writer: &mut BufWriter<OwnedWriteHalf>,
    ) -> Result<(), ConnectionError> {
        let msg = match timeout(self.settings.handshake_timeout, self.read_message()).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectionError::HandshakeTimeout),
        };

        if let Err(e) = ProtocolVersion::check_peer(msg.protocol_version) {
            let reply = ServerMessage::rejected(&format!(
                "Protocol version {} not compatible with server version {}",
                msg.protocol_version,
                ProtocolVersion::CURRENT
            ));
            self.send_direct(writer, &reply).await?;
            return Err(e.into());
        }

        match msg.message {
            MessageType::Connect { client_name } => {
                self.client_name = client_name;
                Ok(())
            }
            other => {
                let reply = ServerMessage::error("Expected connect message for handshake");
                self.send_direct(writer, &reply).await?;
                Err(ConnectionError::UnexpectedMessage(other.name()))
            }
        }
    }

    async fn process_messages(
        &mut self,
        outbox: &Outbox,
        writer_task: &mut JoinHandle<Result<(), ConnectionError>>,
    ) -> Result<(), ConnectionError> {
        let cancel = self.cancel_token.clone();
        let idle_timeout = self.settings.idle_timeout;

        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(connection_id = %self.connection_id, "Shutdown requested");
                    return Ok(());
                }

                result = &mut *writer_task => {
                    return match result {
                        Ok(outcome) => outcome,
                        Err(e) => Err(ConnectionError::WriterFailed(e.to_string())),
                    };
                }

                read = timeout(idle_timeout, self.read_message()) => match read {
                    Ok(Ok(msg)) => msg,
                    Ok(Err(ConnectionError::Protocol(ProtocolError::Eof))) => {
                        debug!(connection_id = %self.connection_id, "Peer closed the stream");
                        return Ok(());
                    }
                    Ok(Err(ConnectionError::Protocol(ProtocolError::Malformed(e)))) => {
                        debug!(connection_id = %self.connection_id, error = %e, "Malformed line");
                        self.reply(
                            outbox,
                            &ServerMessage::error_with_code(&e.to_string(), error_code::MALFORMED),
                        );
                        continue;
                    }
                    Ok(Err(ConnectionError::Protocol(e @ ProtocolError::InvalidUtf8(_)))) => {
                        debug!(connection_id = %self.connection_id, error = %e, "Undecodable line");
                        self.reply(
                            outbox,
                            &ServerMessage::error_with_code(&e.to_string(), error_code::MALFORMED),
                        );
                        continue;
                    }
                    Ok(Err(ConnectionError::Protocol(e @ ProtocolError::LineTooLarge { .. }))) => {
                        debug!(connection_id = %self.connection_id, error = %e, "Oversized line");
                        self.reply(
                            outbox,
                            &ServerMessage::error_with_code(&e.to_string(), error_code::TOO_LARGE),
                        );
                        continue;
                    }
                    Ok(Err(e)) => return Err(e),
                    Err(_) => return Err(ConnectionError::IdleTimeout),
                },
            };

            if !self.handle_message(msg, outbox).await? {
                return Ok(());
            }
        }
    }

    /// Handles one message. Returns false when the client said goodbye.
    async fn handle_message(
        &mut self,
        msg: ClientMessage,
        outbox: &Outbox,
    ) -> Result<bool, ConnectionError> {
        match msg.message {
            MessageType::Message { payload } => {
                self.hub
                    .on_chat_message(self.connection_id.clone(), payload)
                    .await?;
            }

            MessageType::LanguageChange { payload } => {
                self.hub
                    .on_language_change(self.connection_id.clone(), payload)
                    .await?;
            }

            MessageType::Ping { seq } => {
                self.reply(outbox, &ServerMessage::pong(seq));
            }

            MessageType::Connect { .. } => {
                self.reply(
                    outbox,
                    &ServerMessage::error_with_code("Already connected", error_code::ALREADY_CONNECTED),
                );
            }

            MessageType::Disconnect => {
                debug!(connection_id = %self.connection_id, "Client requested disconnect");
                return Ok(false);
            }
        }

        Ok(true)
    }

    async fn read_message(&mut self) -> Result<ClientMessage, ConnectionError> {
        read_line(&mut self.reader, &mut self.line).await?;
        let msg: ClientMessage = decode_line(&self.line)?;

        debug!(
            connection_id = %self.connection_id,
            message_type = msg.message.name(),
            "Received message"
        );

        Ok(msg)
    }

    /// Queues a reply for this connection only, dropping it if the outbox
    /// is full.
    fn reply(&self, outbox: &Outbox, msg: &ServerMessage) {
        if let Err(e) = enqueue(outbox, msg) {
            warn!(connection_id = %self.connection_id, error = %e, "Dropping reply");
        }
    }

    async fn send_direct(
        &self,
        writer: &mut BufWriter<OwnedWriteHalf>,
        msg: &ServerMessage,
    ) -> Result<(), ConnectionError> {
        match timeout(self.settings.write_timeout, write_message(writer, msg)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }
}

fn enqueue(outbox: &Outbox, msg: &ServerMessage) -> Result<(), ConnectionError> {
    let line: Arc<str> = Arc::from(encode_line(msg)?);
    outbox.try_send(line).map_err(|e| match e {
        TrySendError::Full(_) => ConnectionError::OutboxFull,
        TrySendError::Closed(_) => ConnectionError::OutboxClosed,
    })
}

/// Drains an outbox onto the socket until every sender is gone or a write
/// fails.
async fn write_outbox(
    mut writer: BufWriter<OwnedWriteHalf>,
    mut outbox: mpsc::Receiver<Arc<str>>,
    write_timeout: Duration,
) -> Result<(), ConnectionError> {
    while let Some(line) = outbox.recv().await {
        match timeout(write_timeout, write_line(&mut writer, &line)).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectionError::WriteTimeout),
        }
    }
    Ok(())
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Unexpected {0} message during handshake")]
    UnexpectedMessage(&'static str),

    #[error("Handshake timeout")]
    HandshakeTimeout,

    #[error("Idle timeout")]
    IdleTimeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Outbox full")]
    OutboxFull,

    #[error("Outbox closed")]
    OutboxClosed,

    #[error("Writer task failed: {0}")]
    WriterFailed(String),

    #[error("Hub error: {0}")]
    Hub(#[from] HubError),
}
