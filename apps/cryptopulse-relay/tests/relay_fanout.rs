//! Relay Fan-out Integration Tests
//!
//! Tests the full data flow: fake exchange -> feed client -> event pump ->
//! relay server -> WebSocket subscribers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use common::{FakeUpstream, ticker_frame, wait_for};
use cryptopulse_relay::domain::connection::ConnectionStatus;
use cryptopulse_relay::infrastructure::health::UpstreamState;
use cryptopulse_relay::{
    BackoffConfig, FeedClientConfig, RelayServer, RelayServerConfig, SubscriberRegistry, Symbol,
    UpstreamFeedClient, forward_feed_events,
};

type Socket = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct Relay {
    url: String,
    registry: Arc<SubscriberRegistry>,
    upstream_state: Arc<UpstreamState>,
    cancel: CancellationToken,
}

/// Wire the whole relay up against `upstream` on an ephemeral port.
async fn start_relay(upstream: &FakeUpstream) -> Relay {
    let cancel = CancellationToken::new();
    let registry = Arc::new(SubscriberRegistry::default());

    let server = RelayServer::new(
        RelayServerConfig {
            port: 0,
            version: "test-0.0.1".to_string(),
            static_dir: None,
            cors_origin: None,
        },
        Arc::clone(&registry),
        vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
        cancel.clone(),
    );
    let upstream_state = server.upstream_state();

    let mut feed_config = FeedClientConfig::new(
        upstream.url(),
        vec![
            Symbol::new("BTCUSDT").unwrap(),
            Symbol::new("ETHUSDT").unwrap(),
        ],
    );
    feed_config.reconnect = BackoffConfig::fixed(Duration::from_millis(20));
    feed_config.stale_timeout = None;

    let (feed_tx, feed_rx) = mpsc::channel(1024);
    let feed = Arc::new(UpstreamFeedClient::new(feed_config, feed_tx, cancel.clone()));

    tokio::spawn(forward_feed_events(
        feed_rx,
        Arc::clone(&registry),
        Arc::clone(&upstream_state),
    ));
    tokio::spawn(feed.run());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve(listener));

    Relay {
        url: format!("ws://{addr}/"),
        registry,
        upstream_state,
        cancel,
    }
}

async fn subscribe(relay: &Relay) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(relay.url.as_str())
        .await
        .unwrap();
    socket
}

async fn next_json(socket: &mut Socket) -> serde_json::Value {
    loop {
        let msg = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn every_subscriber_receives_each_update() {
    let upstream = FakeUpstream::start().await;
    let relay = start_relay(&upstream).await;

    let mut first = subscribe(&relay).await;
    let mut second = subscribe(&relay).await;
    wait_for(|| relay.registry.len() == 2).await;
    wait_for(|| upstream.subscribes() == 1).await;

    upstream.push(ticker_frame("BTCUSDT", "65000.00000000", "120.5", "2.5"));

    for socket in [&mut first, &mut second] {
        let json = next_json(socket).await;
        assert_eq!(json["type"], "priceUpdate");
        assert_eq!(json["data"]["s"], "BTC");
        assert_eq!(json["data"]["c"], "65000");
        assert_eq!(json["data"]["P"], "120.50");
        assert_eq!(json["data"]["p"], "2.50");
        assert_eq!(json["data"]["n"], "500");
    }

    relay.cancel.cancel();
}

#[tokio::test]
async fn disconnected_subscriber_does_not_affect_others() {
    let upstream = FakeUpstream::start().await;
    let relay = start_relay(&upstream).await;

    let mut stays = subscribe(&relay).await;
    let mut leaves = subscribe(&relay).await;
    wait_for(|| relay.registry.len() == 2).await;
    wait_for(|| upstream.subscribes() == 1).await;

    leaves.close(None).await.unwrap();
    wait_for(|| relay.registry.len() == 1).await;

    upstream.push(ticker_frame("ETHUSDT", "3500.1", "-10", "-0.285"));

    let json = next_json(&mut stays).await;
    assert_eq!(json["data"]["s"], "ETH");
    assert_eq!(json["data"]["c"], "3500.1");
    assert_eq!(json["data"]["P"], "-10.00");
    assert_eq!(json["data"]["p"], "-0.29");

    relay.cancel.cancel();
}

#[tokio::test]
async fn subscribers_survive_upstream_reconnect() {
    let upstream = FakeUpstream::start().await;
    let relay = start_relay(&upstream).await;

    let mut socket = subscribe(&relay).await;
    wait_for(|| relay.registry.len() == 1).await;
    wait_for(|| upstream.subscribes() == 1).await;

    upstream.drop_connections();
    wait_for(|| upstream.subscribes() == 2).await;
    wait_for(|| {
        relay.upstream_state.reconnect_attempts() >= 1
            && relay.upstream_state.status() == ConnectionStatus::Connected
    })
    .await;

    assert_eq!(relay.registry.len(), 1);

    upstream.push(ticker_frame("BTCUSDT", "64000", "0", "0"));
    let json = next_json(&mut socket).await;
    assert_eq!(json["data"]["c"], "64000");
    assert_eq!(json["data"]["P"], "0.00");

    relay.cancel.cancel();
}

#[tokio::test]
async fn malformed_upstream_frames_are_not_forwarded() {
    let upstream = FakeUpstream::start().await;
    let relay = start_relay(&upstream).await;

    let mut socket = subscribe(&relay).await;
    wait_for(|| relay.registry.len() == 1).await;
    wait_for(|| upstream.subscribes() == 1).await;

    upstream.push("{broken");
    upstream.push(ticker_frame("BTCUSDT", "NaN-ish", "1", "1"));
    upstream.push(ticker_frame("BTCUSDT", "1.50", "1", "1"));

    let json = next_json(&mut socket).await;
    assert_eq!(json["data"]["c"], "1.5");
    assert_eq!(upstream.connections(), 1);

    relay.cancel.cancel();
}
