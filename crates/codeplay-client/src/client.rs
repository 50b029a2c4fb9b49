//! Hub connection client.
//!
//! `SyncClient` is the whole surface an application programs against:
//! - keeps one connection to the hub, reconnecting with exponential
//!   backoff for as long as the client lives
//! - emits local chat and language changes while connected
//! - applies received events to [`SessionState`] and notifies subscribers
//!
//! One background task owns the socket. Inside it, a reader task applies
//! inbound lines while the writer loop drains outbound events and pings.
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` outside tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use codeplay_core::{validate_chat_text, ConnectionId, DomainError, LanguageId};
use codeplay_protocol::{
    decode_line, read_line, write_message, ClientMessage, ProtocolError, ProtocolVersion,
    ServerMessage,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::listeners::{Listeners, Subscription};
use crate::state::{ChatEntry, ConnectionStatus, SessionState};

/// Upper bound for the goodbye message on shutdown.
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

/// Floor for the keepalive period; `interval` rejects zero.
const MIN_PING_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Shared State
// ============================================================================

/// State shared between the application-facing handle and the connection
/// task.
struct Shared {
    session: Mutex<SessionState>,
    connection_id: Mutex<Option<ConnectionId>>,
    status: watch::Sender<ConnectionStatus>,
    chat_listeners: Listeners<str>,
    language_listeners: Listeners<LanguageId>,
    status_listeners: Listeners<ConnectionStatus>,
}

impl Shared {
    fn new(config: &ClientConfig) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            session: Mutex::new(SessionState::new(
                config.initial_language.clone(),
                config.chat_history_limit,
            )),
            connection_id: Mutex::new(None),
            status,
            chat_listeners: Listeners::new(),
            language_listeners: Listeners::new(),
            status_listeners: Listeners::new(),
        }
    }

    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    fn set_status(&self, next: ConnectionStatus) {
        let previous = self.status.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Connection status changed");
            self.status_listeners.emit(&next);
        }
    }

    fn set_connection_id(&self, id: Option<ConnectionId>) {
        *self
            .connection_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = id;
    }

    /// Applies one inbound message to local state and notifies subscribers.
    ///
    /// State is updated before handlers run, so a handler reading the
    /// client sees the new value.
    fn apply(&self, message: ServerMessage) {
        match message {
            ServerMessage::Message { payload } => {
                self.session().push_chat(payload.clone());
                self.chat_listeners.emit(payload.as_str());
            }
            ServerMessage::LanguageChange { payload } => {
                debug!(language = %payload, "Language changed remotely");
                self.session().set_language(payload.clone());
                self.language_listeners.emit(&payload);
            }
            ServerMessage::Pong { seq } => {
                debug!(seq, "Received pong");
            }
            ServerMessage::Error { message, code } => {
                warn!(error_message = %message, error_code = ?code, "Received error from hub");
            }
            ServerMessage::Connected { .. } | ServerMessage::Rejected { .. } => {
                warn!("Received handshake message after connection");
            }
        }
    }
}

// ============================================================================
// Sync Client
// ============================================================================

/// Client sync agent: one live hub connection plus the local session view.
///
/// Pass it (or an `Arc` of it) to whatever needs to emit or listen; there
/// is no global instance.
///
/// # Example
///
/// ```rust,no_run
/// use codeplay_client::{ClientConfig, SyncClient};
///
/// # async fn demo() {
/// let client = SyncClient::connect(ClientConfig::default());
/// let _chat = client.on_chat(|text| println!("{text}"));
/// client.send_chat("hello");
/// client.shutdown().await;
/// # }
/// ```
pub struct SyncClient {
    shared: Arc<Shared>,
    outbound: mpsc::Sender<ClientMessage>,
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SyncClient {
    /// Starts connecting in the background and returns immediately.
    ///
    /// Must be called from within a Tokio runtime. Status starts at
    /// `Connecting`; watch [`SyncClient::status_watch`] or subscribe with
    /// [`SyncClient::on_status`] to learn when the client is usable.
    pub fn connect(config: ClientConfig) -> Self {
        let shared = Arc::new(Shared::new(&config));
        let (outbound, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let cancel_token = CancellationToken::new();

        shared.set_status(ConnectionStatus::Connecting);

        let worker = ConnectionWorker {
            backoff: Backoff::from_config(&config),
            config,
            shared: Arc::clone(&shared),
            outbound_rx,
            cancel_token: cancel_token.clone(),
        };
        let task = tokio::spawn(worker.run());

        Self {
            shared,
            outbound,
            cancel_token,
            task: Some(task),
        }
    }

    /// Emits a chat message.
    ///
    /// Returns false, sending nothing, when the text is blank or too long,
    /// when not connected, or when the outbound queue is full. Nothing is
    /// buffered for later. The message shows up in the local transcript
    /// once the hub echoes it back.
    pub fn send_chat(&self, text: &str) -> bool {
        if let Err(e) = validate_chat_text(text) {
            match e {
                DomainError::BlankChat => debug!("Ignoring blank chat message"),
                other => warn!(error = %other, "Refusing to send chat message"),
            }
            return false;
        }

        self.emit(ClientMessage::chat(text))
    }

    /// Selects a language locally and announces it to the session.
    ///
    /// The local selection changes even while disconnected; only the
    /// announcement is skipped. Local changes do not invoke
    /// `on_language_change` handlers, which only see remote changes.
    /// Returns true if the announcement was queued.
    pub fn send_language_change(&self, language: LanguageId) -> bool {
        if language.is_blank() {
            debug!("Ignoring blank language identifier");
            return false;
        }

        self.shared.session().set_language(language.clone());
        self.emit(ClientMessage::language_change(language))
    }

    fn emit(&self, message: ClientMessage) -> bool {
        if !self.shared.status().is_connected() {
            debug!(message_type = message.message.name(), "Not connected, dropping");
            return false;
        }

        match self.outbound.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!(message_type = message.message.name(), "Outbound queue full, dropping");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Registers a handler for every chat message received, own echoes
    /// included.
    pub fn on_chat<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.shared.chat_listeners.subscribe(handler)
    }

    /// Registers a handler for language changes made by other clients.
    pub fn on_language_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&LanguageId) + Send + Sync + 'static,
    {
        self.shared.language_listeners.subscribe(handler)
    }

    /// Registers a handler for connectivity changes.
    pub fn on_status<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.shared.status_listeners.subscribe(handler)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    /// Receiver that always holds the current status.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Waits until the client reaches `status`, up to `limit`.
    ///
    /// Returns false on timeout.
    pub async fn wait_for_status(&self, status: ConnectionStatus, limit: Duration) -> bool {
        let mut rx = self.status_watch();
        let reached = timeout(limit, rx.wait_for(|current| *current == status))
            .await
            .is_ok_and(|result| result.is_ok());
        reached
    }

    /// Identifier the hub assigned to the current connection.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.shared
            .connection_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Currently selected language.
    pub fn language(&self) -> LanguageId {
        self.shared.session().language().clone()
    }

    /// Received chat transcript, oldest first.
    pub fn chat_log(&self) -> Vec<ChatEntry> {
        self.shared.session().chat().cloned().collect()
    }

    /// Drops every subscription, says goodbye to the hub, and stops the
    /// connection task. Status ends at `Closed`.
    pub async fn shutdown(mut self) {
        self.shared.chat_listeners.clear();
        self.shared.language_listeners.clear();
        self.shared.status_listeners.clear();

        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Connection task ended abnormally");
            }
        }
        self.shared.set_status(ConnectionStatus::Closed);
        info!("Sync client shut down");
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// Exponential retry delay, capped, never giving up.
#[derive(Debug, Clone)]
struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    current: Duration,
}

impl Backoff {
    fn from_config(config: &ClientConfig) -> Self {
        Self {
            initial: config.retry_initial_delay,
            max: config.retry_max_delay,
            multiplier: config.retry_multiplier.max(1.0),
            current: config.retry_initial_delay,
        }
    }

    /// Delay to wait now; grows the next one.
    fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        let grown = delay.as_secs_f64() * self.multiplier;
        self.current = Duration::try_from_secs_f64(grown)
            .unwrap_or(self.max)
            .min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

// ============================================================================
// Connection Worker
// ============================================================================

/// Owns the socket for the lifetime of the client.
struct ConnectionWorker {
    config: ClientConfig,
    shared: Arc<Shared>,
    outbound_rx: mpsc::Receiver<ClientMessage>,
    cancel_token: CancellationToken,
    backoff: Backoff,
}

impl ConnectionWorker {
    async fn run(mut self) {
        info!(addr = %self.config.addr, "Sync client starting");

        loop {
            self.shared.set_status(ConnectionStatus::Connecting);

            let Some(stream) = self.connect_with_retry().await else {
                break;
            };

            let established = match self.handle_connection(stream).await {
                Ok(established) => {
                    info!("Connection to hub closed");
                    established
                }
                Err((established, e)) => {
                    warn!(error = %e, "Connection to hub ended with error");
                    established
                }
            };

            self.shared.set_connection_id(None);
            if self.cancel_token.is_cancelled() {
                break;
            }
            self.shared.set_status(ConnectionStatus::Disconnected);
            self.discard_pending();

            // A connection that never got past the handshake counts as a
            // failed attempt.
            if !established && !self.pause().await {
                break;
            }
        }

        self.shared.set_status(ConnectionStatus::Closed);
        debug!("Sync client connection task stopped");
    }

    /// Connects, retrying until success or cancellation.
    async fn connect_with_retry(&mut self) -> Option<TcpStream> {
        let mut attempt = 0u32;

        loop {
            if self.cancel_token.is_cancelled() {
                return None;
            }
            attempt = attempt.saturating_add(1);
            debug!(attempt, addr = %self.config.addr, "Attempting to connect to hub");

            match self.open_stream().await {
                Ok(stream) => {
                    debug!(attempt, "TCP connection established");
                    return Some(stream);
                }
                Err(e) => {
                    if attempt == 1 {
                        warn!(error = %e, "Hub unreachable, will keep retrying");
                    } else {
                        debug!(attempt, error = %e, "Connection attempt failed");
                    }
                }
            }

            if !self.pause().await {
                return None;
            }
        }
    }

    async fn open_stream(&self) -> Result<TcpStream> {
        let addr = self.config.addr.clone();
        match timeout(self.config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                Ok(stream)
            }
            Ok(Err(source)) => Err(ClientError::Connect { addr, source }),
            Err(_) => Err(ClientError::ConnectTimeout { addr }),
        }
    }

    /// Sleeps for the next backoff delay. Returns false if cancelled.
    async fn pause(&mut self) -> bool {
        let delay = self.backoff.next_delay();
        tokio::select! {
            _ = sleep(delay) => true,
            _ = self.cancel_token.cancelled() => false,
        }
    }

    /// Drops events queued for a connection that no longer exists.
    fn discard_pending(&mut self) {
        let mut dropped = 0usize;
        while self.outbound_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "Discarded events queued for a lost connection");
        }
    }

    /// Runs one connection. The boolean reports whether the handshake
    /// succeeded, on both paths.
    async fn handle_connection(
        &mut self,
        stream: TcpStream,
    ) -> std::result::Result<bool, (bool, ClientError)> {
        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut writer = BufWriter::new(writer);

        let connection_id = self
            .handshake(&mut reader, &mut writer)
            .await
            .map_err(|e| (false, e))?;

        info!(connection_id = %connection_id, "Connected to hub");
        self.backoff.reset();
        self.discard_pending();
        self.shared.set_connection_id(Some(connection_id));
        self.shared.set_status(ConnectionStatus::Connected);

        let mut reader_task = tokio::spawn(read_loop(reader, Arc::clone(&self.shared)));
        let result = self.write_loop(&mut writer, &mut reader_task).await;
        reader_task.abort();

        result.map(|()| true).map_err(|e| (true, e))
    }

    async fn handshake(
        &self,
        reader: &mut BufReader<OwnedReadHalf>,
        writer: &mut BufWriter<OwnedWriteHalf>,
    ) -> Result<ConnectionId> {
        write_message(writer, &ClientMessage::connect(self.config.client_name.clone())).await?;

        let mut line = String::new();
        match timeout(self.config.connect_timeout, read_line(reader, &mut line)).await {
            Ok(result) => result?,
            Err(_) => return Err(ClientError::HandshakeTimeout),
        }

        match decode_line::<ServerMessage>(&line)? {
            ServerMessage::Connected {
                protocol_version,
                connection_id,
            } => {
                ProtocolVersion::check_peer(protocol_version)?;
                debug!(protocol_version = %protocol_version, "Handshake complete");
                Ok(connection_id)
            }
            ServerMessage::Rejected {
                reason,
                protocol_version,
            } => Err(ClientError::Rejected {
                reason,
                server_version: protocol_version,
            }),
            ServerMessage::Error { .. } => Err(ClientError::UnexpectedMessage("error")),
            ServerMessage::Message { .. } => Err(ClientError::UnexpectedMessage("message")),
            ServerMessage::LanguageChange { .. } => {
                Err(ClientError::UnexpectedMessage("language-change"))
            }
            ServerMessage::Pong { .. } => Err(ClientError::UnexpectedMessage("pong")),
        }
    }

    /// Sends outbound events and keepalive pings until the connection or
    /// the client ends.
    async fn write_loop(
        &mut self,
        writer: &mut BufWriter<OwnedWriteHalf>,
        reader_task: &mut JoinHandle<Result<()>>,
    ) -> Result<()> {
        let cancel = self.cancel_token.clone();
        let mut ping = interval(self.config.ping_interval.max(MIN_PING_INTERVAL));
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ping.tick().await;
        let mut seq = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let goodbye = ClientMessage::disconnect();
                    let _ = timeout(DISCONNECT_GRACE, write_message(writer, &goodbye)).await;
                    return Ok(());
                }

                result = &mut *reader_task => {
                    return match result {
                        Ok(outcome) => outcome,
                        Err(e) => Err(ClientError::ReaderFailed(e.to_string())),
                    };
                }

                message = self.outbound_rx.recv() => {
                    let Some(message) = message else {
                        // Every sender is gone; the client handle was dropped.
                        return Ok(());
                    };
                    write_message(writer, &message).await?;
                    debug!(message_type = message.message.name(), "Sent message to hub");
                }

                _ = ping.tick() => {
                    seq = seq.wrapping_add(1);
                    write_message(writer, &ClientMessage::ping(seq)).await?;
                }
            }
        }
    }
}

/// Applies inbound lines until the hub closes the stream.
async fn read_loop(mut reader: BufReader<OwnedReadHalf>, shared: Arc<Shared>) -> Result<()> {
    let mut line = String::new();

    loop {
        match read_line(&mut reader, &mut line).await {
            Ok(()) => match decode_line::<ServerMessage>(&line) {
                Ok(message) => shared.apply(message),
                Err(e) => warn!(error = %e, "Failed to parse message from hub"),
            },
            Err(ProtocolError::Eof) => {
                info!("Hub closed connection");
                return Ok(());
            }
            Err(e @ (ProtocolError::LineTooLarge { .. } | ProtocolError::InvalidUtf8(_))) => {
                warn!(error = %e, "Skipping unreadable line from hub");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn shared() -> Shared {
        Shared::new(&ClientConfig::default())
    }

    // ------------------------------------------------------------------------
    // Inbound handling
    // ------------------------------------------------------------------------

    #[test]
    fn test_apply_chat_records_and_notifies() {
        let shared = shared();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = shared
            .chat_listeners
            .subscribe(move |text| sink.lock().unwrap().push(text.to_string()));

        shared.apply(ServerMessage::chat("hello"));
        shared.apply(ServerMessage::chat("world"));

        assert_eq!(*seen.lock().unwrap(), vec!["hello", "world"]);
        let log: Vec<String> = shared.session().chat().map(|e| e.text.clone()).collect();
        assert_eq!(log, vec!["hello", "world"]);
    }

    #[test]
    fn test_apply_language_updates_state_before_handlers() {
        let shared = Arc::new(shared());
        let observed = Arc::new(Mutex::new(None));

        let reader = Arc::clone(&shared);
        let sink = Arc::clone(&observed);
        let _sub = shared.language_listeners.subscribe(move |_| {
            *sink.lock().unwrap() = Some(reader.session().language().clone());
        });

        shared.apply(ServerMessage::language_change(LanguageId::new("python")));

        assert_eq!(*observed.lock().unwrap(), Some(LanguageId::new("python")));
    }

    #[test]
    fn test_apply_ignores_control_messages() {
        let shared = shared();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let _sub = shared.chat_listeners.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        shared.apply(ServerMessage::pong(3));
        shared.apply(ServerMessage::error("boom"));
        shared.apply(ServerMessage::connected(ConnectionId::from_sequence(1)));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(shared.session().language().as_str(), "javascript");
    }

    #[test]
    fn test_status_listeners_fire_on_change_only() {
        let shared = shared();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = shared
            .status_listeners
            .subscribe(move |s| sink.lock().unwrap().push(*s));

        shared.set_status(ConnectionStatus::Connecting);
        shared.set_status(ConnectionStatus::Connecting);
        shared.set_status(ConnectionStatus::Connected);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );
    }

    // ------------------------------------------------------------------------
    // Backoff
    // ------------------------------------------------------------------------

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = ClientConfig {
            retry_initial_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_millis(500),
            retry_multiplier: 2.0,
            ..Default::default()
        };
        let mut backoff = Backoff::from_config(&config);

        let delays: Vec<u128> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_backoff_multiplier_below_one_is_flat() {
        let config = ClientConfig {
            retry_initial_delay: Duration::from_millis(50),
            retry_multiplier: 0.1,
            ..Default::default()
        };
        let mut backoff = Backoff::from_config(&config);
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
    }

    // ------------------------------------------------------------------------
    // Emission preconditions
    // ------------------------------------------------------------------------

    fn unreachable_config() -> ClientConfig {
        ClientConfig {
            // Port 1 on localhost refuses immediately.
            addr: "127.0.0.1:1".to_string(),
            retry_initial_delay: Duration::from_millis(20),
            retry_max_delay: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sends_are_noops_while_disconnected() {
        let client = SyncClient::connect(unreachable_config());

        assert!(!client.is_connected());
        assert!(!client.send_chat("hello"));
        assert!(!client.send_language_change(LanguageId::new("go")));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_local_language_applies_while_disconnected() {
        let client = SyncClient::connect(unreachable_config());

        client.send_language_change(LanguageId::new("rust"));
        assert_eq!(client.language(), LanguageId::new("rust"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_blank_input_is_rejected() {
        let client = SyncClient::connect(unreachable_config());

        assert!(!client.send_chat("   "));
        assert!(!client.send_chat(""));
        assert!(!client.send_language_change(LanguageId::new(" ")));
        assert_eq!(client.language().as_str(), "javascript");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_while_retrying_reaches_closed() {
        let client = SyncClient::connect(unreachable_config());
        let watch = client.status_watch();

        tokio::time::sleep(Duration::from_millis(60)).await;
        client.shutdown().await;

        assert_eq!(*watch.borrow(), ConnectionStatus::Closed);
    }
}
