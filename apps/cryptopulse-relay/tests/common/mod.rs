//! Shared fixtures: a scripted exchange stream on a loopback port.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;

/// Commands pushed to every live upstream connection.
#[derive(Debug, Clone)]
enum Command {
    Frame(String),
    Drop,
}

/// Connection counters observed by the fake exchange.
#[derive(Debug, Default)]
pub struct Counters {
    pub connections: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub subscribes: AtomicUsize,
}

/// Fake exchange ticker stream.
pub struct FakeUpstream {
    pub addr: SocketAddr,
    pub counters: Arc<Counters>,
    commands: broadcast::Sender<Command>,
}

impl FakeUpstream {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let counters = Arc::new(Counters::default());
        let (commands, _) = broadcast::channel(64);

        let accept_counters = Arc::clone(&counters);
        let accept_commands = commands.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let counters = Arc::clone(&accept_counters);
                let commands = accept_commands.subscribe();
                tokio::spawn(serve_connection(stream, counters, commands));
            }
        });

        Self {
            addr,
            counters,
            commands,
        }
    }

    /// Base URL for the feed client.
    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Send a text frame on every live connection.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.commands.send(Command::Frame(frame.into()));
    }

    /// Close every live connection from the server side.
    pub fn drop_connections(&self) {
        let _ = self.commands.send(Command::Drop);
    }

    pub fn subscribes(&self) -> usize {
        self.counters.subscribes.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> usize {
        self.counters.connections.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.counters.max_active.load(Ordering::SeqCst)
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    counters: Arc<Counters>,
    mut commands: broadcast::Receiver<Command>,
) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    counters.connections.fetch_add(1, Ordering::SeqCst);
    let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
    counters.max_active.fetch_max(active, Ordering::SeqCst);

    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let request: serde_json::Value = serde_json::from_str(&text).unwrap();
                    if request["method"] == "SUBSCRIBE" {
                        counters.subscribes.fetch_add(1, Ordering::SeqCst);
                        let reply = serde_json::json!({"result": null, "id": request["id"]});
                        let _ = write.send(Message::Text(reply.to_string().into())).await;
                    }
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            command = commands.recv() => match command {
                Ok(Command::Frame(frame)) => {
                    if write.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Ok(Command::Drop) | Err(_) => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }

    counters.active.fetch_sub(1, Ordering::SeqCst);
}

/// A 24h ticker event as the exchange sends it.
pub fn ticker_frame(symbol: &str, last: &str, change: &str, change_percent: &str) -> String {
    serde_json::json!({
        "e": "24hrTicker",
        "E": 1_700_000_000_000_u64,
        "s": symbol,
        "c": last,
        "P": change,
        "p": change_percent,
        "v": "1000.5",
        "h": "66000.00",
        "l": "64000.00",
        "o": "64880.00",
        "n": "500"
    })
    .to_string()
}

/// Poll `condition` until it holds or the deadline passes.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
