//! Shared helpers for codeplayd integration tests.
//!
//! Tests may `.unwrap()`/`.expect()` freely; production code may not.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use codeplay_core::ConnectionId;
use codeplay_protocol::{
    decode_line, encode_line, ClientMessage, MessageType, ProtocolVersion, ServerMessage,
};
use codeplayd::{bind_server, HubHandle, ServerConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for any single expected message
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to listen before concluding nothing is coming
pub const SILENCE_WINDOW: Duration = Duration::from_millis(200);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Test Server
// ============================================================================

/// A real server on an ephemeral localhost port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: HubHandle,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl TestServer {
    pub fn config() -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        }
    }

    pub async fn spawn() -> Self {
        Self::spawn_with(Self::config()).await
    }

    pub async fn spawn_with(config: ServerConfig) -> Self {
        let cancel_token = CancellationToken::new();
        let server = bind_server(&config, cancel_token.clone())
            .await
            .expect("bind test server");
        let addr = server.local_addr().expect("local addr");
        let hub = server.hub().clone();

        let task = tokio::spawn(async move {
            let _ = server.run().await;
        });

        Self {
            addr,
            hub,
            cancel_token,
            task,
        }
    }

    /// Opens a socket without handshaking.
    pub async fn connect_raw(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }

    /// Opens a socket and completes the handshake.
    pub async fn join(&self) -> (TestClient, ConnectionId) {
        let mut client = self.connect_raw().await;
        let id = client.handshake().await;
        (client, id)
    }

    /// Polls the hub until it holds `expected` connections.
    pub async fn wait_for_size(&self, expected: usize) {
        let deadline = Instant::now() + RECV_TIMEOUT;
        loop {
            let size = self.hub.size().await;
            if size == expected {
                return;
            }
            assert!(
                Instant::now() < deadline,
                "hub size stuck at {size}, expected {expected}"
            );
            sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        let _ = timeout(RECV_TIMEOUT, self.task).await;
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

// ============================================================================
// Test Client
// ============================================================================

/// Raw protocol client.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr)
            .await
            .expect("connect to test server");
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    pub async fn send(&mut self, msg: ClientMessage) {
        let line = encode_line(&msg).unwrap();
        self.send_raw(line.as_bytes()).await;
    }

    pub async fn send_raw(&mut self, data: &[u8]) {
        self.writer.write_all(data).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    pub async fn chat(&mut self, text: &str) {
        self.send(ClientMessage::chat(text)).await;
    }

    pub async fn change_language(&mut self, id: &str) {
        self.send(ClientMessage::language_change(id.parse().unwrap()))
            .await;
    }

    /// Next line, or `None` once the server closed the stream.
    pub async fn recv_line(&mut self, wait: Duration) -> Option<String> {
        let mut line = String::new();
        match timeout(wait, self.reader.read_line(&mut line)).await {
            Ok(Ok(0)) | Ok(Err(_)) => None,
            Ok(Ok(_)) => Some(line),
            Err(_) => panic!("no line within {wait:?}"),
        }
    }

    pub async fn recv(&mut self) -> ServerMessage {
        let line = self
            .recv_line(RECV_TIMEOUT)
            .await
            .expect("server closed the connection");
        decode_line(&line).unwrap()
    }

    /// Returns the next message if one arrives within `wait`.
    pub async fn try_recv(&mut self, wait: Duration) -> Option<ServerMessage> {
        let mut line = String::new();
        match timeout(wait, self.reader.read_line(&mut line)).await {
            Ok(Ok(n)) if n > 0 => Some(decode_line(&line).unwrap()),
            _ => None,
        }
    }

    /// Asserts the server closes the stream.
    pub async fn expect_closed(&mut self) {
        assert_eq!(self.recv_line(RECV_TIMEOUT).await, None);
    }

    pub async fn handshake(&mut self) -> ConnectionId {
        self.send(ClientMessage::connect(Some("test".to_string())))
            .await;

        match self.recv().await {
            ServerMessage::Connected {
                connection_id,
                protocol_version,
            } => {
                assert_eq!(protocol_version, ProtocolVersion::CURRENT);
                connection_id
            }
            other => panic!("Expected Connected, got {other:?}"),
        }
    }

    pub async fn disconnect(mut self) {
        self.send(ClientMessage::disconnect()).await;
    }
}

/// A connect message advertising a different protocol version.
pub fn connect_with_version(major: u16, minor: u16) -> ClientMessage {
    ClientMessage {
        protocol_version: ProtocolVersion::new(major, minor),
        message: MessageType::Connect { client_name: None },
    }
}
