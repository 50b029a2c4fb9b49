//! Sync client against a real hub on localhost.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use codeplay_client::{ClientConfig, ConnectionStatus, SyncClient};
use codeplay_core::LanguageId;
use codeplayd::{bind_server, HubHandle, ServerConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(3);

struct Hub {
    addr: SocketAddr,
    handle: HubHandle,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl Hub {
    async fn start(port: u16) -> Self {
        let config = ServerConfig {
            bind: "127.0.0.1".to_string(),
            port,
            ..ServerConfig::default()
        };
        let cancel_token = CancellationToken::new();
        let server = bind_server(&config, cancel_token.clone())
            .await
            .expect("bind hub");
        let addr = server.local_addr().expect("local addr");
        let handle = server.hub().clone();
        let task = tokio::spawn(async move {
            let _ = server.run().await;
        });

        Self {
            addr,
            handle,
            cancel_token,
            task,
        }
    }

    async fn stop(self) {
        self.cancel_token.cancel();
        let _ = timeout(WAIT, self.task).await;
    }

    async fn wait_for_size(&self, expected: usize) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.handle.size().await != expected {
            assert!(
                tokio::time::Instant::now() < deadline,
                "hub never reached {expected} connections"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

fn client_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        addr: addr.to_string(),
        retry_initial_delay: Duration::from_millis(50),
        retry_max_delay: Duration::from_millis(200),
        ..ClientConfig::default()
    }
}

async fn connected_client(addr: SocketAddr) -> SyncClient {
    let client = SyncClient::connect(client_config(addr));
    assert!(
        client
            .wait_for_status(ConnectionStatus::Connected, WAIT)
            .await,
        "client never connected"
    );
    client
}

/// Forwards every chat message a client receives into a channel.
fn chat_feed(client: &SyncClient) -> (mpsc::UnboundedReceiver<String>, codeplay_client::Subscription) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = client.on_chat(move |text| {
        let _ = tx.send(text.to_string());
    });
    (rx, sub)
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("feed closed")
}

#[tokio::test]
async fn test_client_connects_and_gets_an_id() {
    let hub = Hub::start(0).await;
    let client = connected_client(hub.addr).await;

    let id = client.connection_id().expect("connection id");
    assert!(hub.handle.contains(id).await);

    client.shutdown().await;
    hub.stop().await;
}

#[tokio::test]
async fn test_chat_is_echoed_to_sender_and_peer() {
    let hub = Hub::start(0).await;
    let alice = connected_client(hub.addr).await;
    let bob = connected_client(hub.addr).await;
    hub.wait_for_size(2).await;

    let (mut alice_feed, _a) = chat_feed(&alice);
    let (mut bob_feed, _b) = chat_feed(&bob);

    assert!(alice.send_chat("hello"));

    assert_eq!(next(&mut alice_feed).await, "hello");
    assert_eq!(next(&mut bob_feed).await, "hello");
    assert_eq!(alice.chat_log().len(), 1);

    alice.shutdown().await;
    bob.shutdown().await;
    hub.stop().await;
}

#[tokio::test]
async fn test_language_change_reaches_peer_only() {
    let hub = Hub::start(0).await;
    let alice = connected_client(hub.addr).await;
    let bob = connected_client(hub.addr).await;
    hub.wait_for_size(2).await;

    let alice_seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&alice_seen);
    let _a = alice.on_language_change(move |lang| sink.lock().unwrap().push(lang.clone()));

    let (tx, mut bob_langs) = mpsc::unbounded_channel();
    let _b = bob.on_language_change(move |lang| {
        let _ = tx.send(lang.clone());
    });
    let (mut alice_feed, _c) = chat_feed(&alice);

    assert!(alice.send_language_change(LanguageId::new("python")));
    // The chat from the same sender is relayed after the language change.
    assert!(alice.send_chat("marker"));

    assert_eq!(next(&mut bob_langs).await, LanguageId::new("python"));
    assert_eq!(bob.language(), LanguageId::new("python"));
    assert_eq!(next(&mut alice_feed).await, "marker");

    assert!(alice_seen.lock().unwrap().is_empty());
    assert_eq!(alice.language(), LanguageId::new("python"));

    alice.shutdown().await;
    bob.shutdown().await;
    hub.stop().await;
}

#[tokio::test]
async fn test_late_joiner_adopts_session_language() {
    let hub = Hub::start(0).await;
    let alice = connected_client(hub.addr).await;
    let (mut alice_feed, _a) = chat_feed(&alice);

    alice.send_language_change(LanguageId::new("rust"));
    alice.send_chat("sync");
    assert_eq!(next(&mut alice_feed).await, "sync");

    let late = connected_client(hub.addr).await;
    let (mut late_feed, _b) = chat_feed(&late);
    alice.send_chat("ping");
    assert_eq!(next(&mut late_feed).await, "ping");

    assert_eq!(late.language(), LanguageId::new("rust"));

    alice.shutdown().await;
    late.shutdown().await;
    hub.stop().await;
}

#[tokio::test]
async fn test_dropped_subscription_stops_delivery() {
    let hub = Hub::start(0).await;
    let client = connected_client(hub.addr).await;

    let count = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&count);
    let sub = client.on_chat(move |_| *counter.lock().unwrap() += 1);
    let (mut feed, _keep) = chat_feed(&client);

    client.send_chat("one");
    assert_eq!(next(&mut feed).await, "one");
    sub.unsubscribe();

    client.send_chat("two");
    assert_eq!(next(&mut feed).await, "two");

    assert_eq!(*count.lock().unwrap(), 1);

    client.shutdown().await;
    hub.stop().await;
}

#[tokio::test]
async fn test_client_reconnects_after_hub_restart() {
    let hub = Hub::start(0).await;
    let port = hub.addr.port();
    let client = connected_client(hub.addr).await;
    let mut status = client.status_watch();

    hub.stop().await;
    timeout(
        WAIT,
        status.wait_for(|s| *s == ConnectionStatus::Disconnected || *s == ConnectionStatus::Connecting),
    )
    .await
    .expect("client never noticed the outage")
    .expect("status channel closed");
    assert!(!client.send_chat("into the void"));

    let hub = Hub::start(port).await;
    assert!(
        client
            .wait_for_status(ConnectionStatus::Connected, WAIT)
            .await,
        "client never reconnected"
    );

    let (mut feed, _sub) = chat_feed(&client);
    assert!(client.send_chat("back"));
    assert_eq!(next(&mut feed).await, "back");

    client.shutdown().await;
    hub.stop().await;
}

#[tokio::test]
async fn test_zero_ping_interval_still_syncs() {
    let hub = Hub::start(0).await;
    let client = SyncClient::connect(ClientConfig {
        ping_interval: Duration::ZERO,
        ..client_config(hub.addr)
    });
    assert!(
        client
            .wait_for_status(ConnectionStatus::Connected, WAIT)
            .await
    );

    // Long enough for several keepalive ticks.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert_eq!(hub.handle.size().await, 1);

    let (mut feed, _sub) = chat_feed(&client);
    assert!(client.send_chat("still syncing"));
    assert_eq!(next(&mut feed).await, "still syncing");

    client.shutdown().await;
    hub.stop().await;
}

#[tokio::test]
async fn test_shutdown_unregisters_and_closes() {
    let hub = Hub::start(0).await;
    let client = connected_client(hub.addr).await;
    let status = client.status_watch();
    hub.wait_for_size(1).await;

    client.shutdown().await;

    assert_eq!(*status.borrow(), ConnectionStatus::Closed);
    hub.wait_for_size(0).await;
    hub.stop().await;
}
