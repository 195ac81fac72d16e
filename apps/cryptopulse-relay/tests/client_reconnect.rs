//! Relay Client Integration Tests
//!
//! Runs the reconnecting subscriber against loopback relays: a dead port,
//! and a scripted relay that sends frames and hangs up.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use cryptopulse_relay::{
    BackoffConfig, ClientEvent, ClientReconnector, ClientReconnectorConfig, ConnectionStatus,
    TradeCount,
};

fn price_update(symbol: &str, last: &str) -> String {
    serde_json::json!({
        "type": "priceUpdate",
        "data": {
            "s": symbol, "c": last, "P": "1.00", "p": "0.50",
            "v": "10", "h": "2", "l": "1", "o": "1.5", "n": 42
        }
    })
    .to_string()
}

/// An address nothing listens on.
async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Accept one connection on `listener`, send `frames`, then close.
async fn serve_once(listener: TcpListener, frames: Vec<String>) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
    for frame in frames {
        ws.send(Message::Text(frame.into())).await.unwrap();
    }
    let _ = ws.close(None).await;
}

fn start_client(
    addr: SocketAddr,
) -> (
    Arc<ClientReconnector>,
    mpsc::Receiver<ClientEvent>,
    CancellationToken,
) {
    let mut config = ClientReconnectorConfig::new(format!("ws://{addr}"));
    config.backoff = BackoffConfig::exponential(Duration::from_millis(1), Duration::from_millis(5), 5);

    let (tx, rx) = mpsc::channel(256);
    let cancel = CancellationToken::new();
    let client = Arc::new(ClientReconnector::new(config, tx, cancel.clone()));
    tokio::spawn(Arc::clone(&client).run());

    (client, rx, cancel)
}

async fn next_event(rx: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for client event")
        .expect("client event channel closed")
}

/// Drain events up to and including `GaveUp`, returning the retry attempts seen.
async fn attempts_until_gave_up(rx: &mut mpsc::Receiver<ClientEvent>) -> Vec<u32> {
    let mut attempts = Vec::new();
    loop {
        match next_event(rx).await {
            ClientEvent::Reconnecting { attempt, .. } => attempts.push(attempt),
            ClientEvent::GaveUp => return attempts,
            _ => {}
        }
    }
}

#[tokio::test]
async fn gives_up_after_five_retries() {
    let (client, mut rx, cancel) = start_client(dead_addr().await);

    let attempts = attempts_until_gave_up(&mut rx).await;

    assert_eq!(attempts, vec![1, 2, 3, 4, 5]);
    assert_eq!(client.status(), ConnectionStatus::GaveUp);

    // Parked: no further automatic attempts
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    cancel.cancel();
}

#[tokio::test]
async fn retry_delays_double_up_to_the_cap() {
    let (_client, mut rx, cancel) = start_client(dead_addr().await);

    let mut delays = Vec::new();
    loop {
        match next_event(&mut rx).await {
            ClientEvent::Reconnecting { delay, .. } => delays.push(delay.as_millis()),
            ClientEvent::GaveUp => break,
            _ => {}
        }
    }

    assert_eq!(delays, vec![2, 4, 5, 5, 5]);
    cancel.cancel();
}

#[tokio::test]
async fn manual_reconnect_recovers_after_giving_up() {
    let addr = dead_addr().await;
    let (client, mut rx, cancel) = start_client(addr);
    attempts_until_gave_up(&mut rx).await;

    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(serve_once(listener, vec![price_update("SOL", "150.25")]));
    client.reconnect();

    assert_eq!(next_event(&mut rx).await, ClientEvent::Connected);
    assert_eq!(client.attempt(), 0);

    match next_event(&mut rx).await {
        ClientEvent::Update(snapshot) => assert_eq!(snapshot.symbol, "SOL"),
        other => panic!("expected update, got {other:?}"),
    }

    cancel.cancel();
}

#[tokio::test]
async fn applies_updates_and_skips_malformed_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_once(
        listener,
        vec![
            price_update("BTC", "65000"),
            "garbage".to_string(),
            r#"{"type":"somethingElse","data":{}}"#.to_string(),
            price_update("BTC", "65010.5"),
        ],
    ));

    let (client, mut rx, cancel) = start_client(addr);
    assert_eq!(next_event(&mut rx).await, ClientEvent::Connected);

    let mut prices = Vec::new();
    while prices.len() < 2 {
        if let ClientEvent::Update(snapshot) = next_event(&mut rx).await {
            prices.push(snapshot.last_price.clone());
        }
    }
    assert_eq!(prices, vec!["65000", "65010.5"]);

    let market = client.market();
    assert_eq!(market.snapshot("BTC").unwrap().last_price, "65010.5");
    assert_eq!(market.snapshot("BTC").unwrap().trade_count, TradeCount::Count(42));
    assert_eq!(market.history().len("BTC"), 2);

    cancel.cancel();
}

#[tokio::test]
async fn reconnects_when_relay_hangs_up() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _ = ws.close(None).await;
        drop(ws);

        // Second connection stays up
        let (stream, _) = listener.accept().await.unwrap();
        let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        std::future::pending::<()>().await;
    });

    let (client, mut rx, cancel) = start_client(addr);

    assert_eq!(next_event(&mut rx).await, ClientEvent::Connected);
    assert_eq!(next_event(&mut rx).await, ClientEvent::Disconnected);
    assert!(matches!(
        next_event(&mut rx).await,
        ClientEvent::Reconnecting { attempt: 1, .. }
    ));
    assert_eq!(next_event(&mut rx).await, ClientEvent::Connected);
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert_eq!(client.attempt(), 0);

    cancel.cancel();
}

#[tokio::test]
async fn second_run_is_rejected() {
    let (client, _rx, cancel) = start_client(dead_addr().await);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let second = Arc::clone(&client).run().await;
    assert!(second.is_err());

    cancel.cancel();
}
