//! Reconnecting Relay Client
//!
//! Subscriber side of the relay. Keeps a [`MarketView`] current from the
//! relay's price updates and reconnects with exponential backoff:
//!
//! ```text
//! Connecting ──► Connected ──► Disconnected ──► Connecting ...
//!                                    │
//!                                    └── attempt >= max ──► GaveUp
//! ```
//!
//! After giving up only a manual [`ClientReconnector::reconnect`] starts a
//! new connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use crate::application::services::MarketView;
use crate::domain::connection::{BackoffConfig, ConnectionStatus, ReconnectState, RetryDecision};
use crate::domain::market::{DEFAULT_HISTORY_CAPACITY, TickerSnapshot};
use crate::infrastructure::relay::wire::WireMessage;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the relay client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A connection loop is already running for this client.
    #[error("client already running")]
    AlreadyRunning,

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// A manual reconnect replaced the current connection.
    #[error("manual reconnect requested")]
    ManualReconnect,
}

// =============================================================================
// Client Events
// =============================================================================

/// Events emitted by the relay client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Handshake completed.
    Connected,
    /// Connection closed, failed, or could not be opened.
    Disconnected,
    /// Retry scheduled.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// Price update applied to the market view.
    Update(Box<TickerSnapshot>),
    /// Retry budget exhausted; manual reconnect required.
    GaveUp,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the relay client.
#[derive(Debug, Clone)]
pub struct ClientReconnectorConfig {
    /// Relay WebSocket URL.
    pub url: String,
    /// Backoff between attempts.
    pub backoff: BackoffConfig,
    /// Price points kept per symbol.
    pub history_capacity: usize,
}

impl ClientReconnectorConfig {
    /// Create a configuration with the default backoff and history size.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backoff: BackoffConfig::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Relay client with bounded exponential reconnect.
pub struct ClientReconnector {
    config: ClientReconnectorConfig,
    state: parking_lot::Mutex<ReconnectState>,
    market: parking_lot::RwLock<MarketView>,
    event_tx: mpsc::Sender<ClientEvent>,
    manual: Notify,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl ClientReconnector {
    /// Create a new client.
    #[must_use]
    pub fn new(
        config: ClientReconnectorConfig,
        event_tx: mpsc::Sender<ClientEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let state = ReconnectState::new(config.backoff.clone());
        let market = MarketView::new(config.history_capacity);

        Self {
            config,
            state: parking_lot::Mutex::new(state),
            market: parking_lot::RwLock::new(market),
            event_tx,
            manual: Notify::new(),
            cancel,
            running: AtomicBool::new(false),
        }
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.state.lock().status()
    }

    /// Retries scheduled since the last successful connect.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.state.lock().attempt()
    }

    /// Copy of the market view.
    #[must_use]
    pub fn market(&self) -> MarketView {
        self.market.read().clone()
    }

    /// Latest snapshot for one symbol.
    #[must_use]
    pub fn snapshot(&self, symbol: &str) -> Option<TickerSnapshot> {
        self.market.read().snapshot(symbol).cloned()
    }

    /// Request an immediate reconnect.
    ///
    /// Cancels any pending retry timer and resets the attempt counter. After
    /// the client has given up this is the only way to connect again.
    pub fn reconnect(&self) {
        tracing::info!("Manual reconnect requested");
        self.manual.notify_one();
    }

    /// Run the connection loop until cancelled.
    ///
    /// Giving up does not end the loop; it parks until [`reconnect`] or
    /// cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AlreadyRunning`] if another loop is active.
    ///
    /// [`reconnect`]: ClientReconnector::reconnect
    pub async fn run(self: Arc<Self>) -> Result<(), ClientError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ClientError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            self.state.lock().on_connecting();
            let error = match self.connect_and_run().await {
                Ok(()) => {
                    tracing::info!("Relay client stopped");
                    return Ok(());
                }
                Err(ClientError::ManualReconnect) => {
                    self.state.lock().restart();
                    continue;
                }
                Err(e) => e,
            };

            tracing::warn!(error = %error, url = %self.config.url, "Relay connection lost");
            let decision = self.state.lock().on_disconnected();
            let _ = self.event_tx.send(ClientEvent::Disconnected).await;

            match decision {
                RetryDecision::RetryAfter { attempt, delay } => {
                    tracing::info!(
                        attempt,
                        max_attempts = self.config.backoff.max_attempts,
                        delay_ms = delay.as_millis(),
                        "Reconnecting to relay"
                    );
                    let _ = self
                        .event_tx
                        .send(ClientEvent::Reconnecting { attempt, delay })
                        .await;

                    tokio::select! {
                        () = self.cancel.cancelled() => return Ok(()),
                        () = self.manual.notified() => self.state.lock().restart(),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp => {
                    tracing::error!(
                        attempts = self.config.backoff.max_attempts,
                        "Relay unreachable, manual reconnect required"
                    );
                    let _ = self.event_tx.send(ClientEvent::GaveUp).await;

                    tokio::select! {
                        () = self.cancel.cancelled() => return Ok(()),
                        () = self.manual.notified() => self.state.lock().restart(),
                    }
                }
            }
        }
    }

    /// Connect and apply updates until error, manual reconnect, or cancellation.
    async fn connect_and_run(&self) -> Result<(), ClientError> {
        tracing::debug!(url = %self.config.url, "Connecting to relay");

        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            () = self.manual.notified() => return Err(ClientError::ManualReconnect),
            result = tokio_tungstenite::connect_async(self.config.url.as_str()) => result?,
        };

        self.state.lock().on_connected();
        tracing::info!(url = %self.config.url, "Connected to relay");
        let _ = self.event_tx.send(ClientEvent::Connected).await;

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                () = self.manual.notified() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Err(ClientError::ManualReconnect);
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text_message(&text).await,
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => return Err(ClientError::ConnectionClosed),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(ClientError::ConnectionClosed),
                    }
                }
            }
        }
    }

    /// Apply one relay frame. Malformed frames are dropped; the link stays up.
    async fn handle_text_message(&self, text: &str) {
        match WireMessage::from_json(text) {
            Ok(WireMessage::PriceUpdate(payload)) => {
                let snapshot = payload.into_snapshot(Utc::now());
                self.market.write().apply(snapshot.clone());
                let _ = self
                    .event_tx
                    .send(ClientEvent::Update(Box::new(snapshot)))
                    .await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed relay message");
            }
        }
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
