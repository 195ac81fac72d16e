//! Upstream Feed Client
//!
//! Holds the relay's single connection to the exchange ticker stream.
//!
//! # Stream URL
//!
//! `<base>/<symbol>@ticker/<symbol>@ticker/...`, e.g.
//! `wss://stream.binance.com:9443/ws/btcusdt@ticker/ethusdt@ticker`
//!
//! # Protocol
//!
//! After the socket opens a single `SUBSCRIBE` request for the configured
//! symbols is sent. Every `24hrTicker` event is transformed and emitted as a
//! [`FeedEvent::Update`]. On any close the client waits a fixed delay and
//! reconnects with the same subscription.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, JsonCodec};
use super::messages::{SubscribeRequest, UpstreamMessage};
use crate::domain::connection::{BackoffConfig, ReconnectState, RetryDecision};
use crate::domain::market::Symbol;
use crate::infrastructure::metrics::{self, DropReason};
use crate::infrastructure::relay::transform::TickerTransformer;
use crate::infrastructure::relay::wire::WireMessage;

/// Default exchange stream base URL.
pub const DEFAULT_UPSTREAM_URL: &str = "wss://stream.binance.com:9443/ws";

/// Default fixed delay between upstream reconnects.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default silence after which the link is recycled.
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the upstream feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// A connection loop is already running for this client.
    #[error("upstream feed already running")]
    AlreadyRunning,

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Nothing arrived within the stale timeout.
    #[error("no upstream traffic for {0:?}")]
    Stale(Duration),

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Nobody is receiving feed events any more.
    #[error("feed event receiver dropped")]
    ChannelClosed,
}

// =============================================================================
// Feed Events
// =============================================================================

/// Events emitted by the upstream feed client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Socket opened and subscribe request sent.
    Connected,
    /// Socket closed or failed.
    Disconnected,
    /// Waiting before the next connection attempt.
    Reconnecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// Transformed ticker ready for fan-out.
    Update(WireMessage),
    /// Exchange acknowledged the subscribe request.
    Subscribed,
    /// Exchange rejected a control request.
    Error(String),
    /// Retry budget exhausted; the loop has stopped.
    GaveUp,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the upstream feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// Stream base URL.
    pub url: String,
    /// Symbols to subscribe, in order.
    pub symbols: Vec<Symbol>,
    /// Quote asset stripped from outgoing symbols.
    pub quote_asset: String,
    /// Reconnection delays.
    pub reconnect: BackoffConfig,
    /// Recycle the link after this much silence (`None` disables).
    pub stale_timeout: Option<Duration>,
}

impl FeedClientConfig {
    /// Create a configuration with default delays.
    #[must_use]
    pub fn new(url: impl Into<String>, symbols: Vec<Symbol>) -> Self {
        Self {
            url: url.into(),
            symbols,
            quote_asset: "USDT".to_string(),
            reconnect: BackoffConfig::fixed(DEFAULT_RECONNECT_DELAY),
            stale_timeout: Some(DEFAULT_STALE_TIMEOUT),
        }
    }

    /// Full stream URL with one ticker stream per symbol.
    #[must_use]
    pub fn stream_url(&self) -> String {
        let streams: Vec<String> = self.symbols.iter().map(Symbol::ticker_stream).collect();
        let base = self.url.trim_end_matches('/');

        if streams.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{}", streams.join("/"))
        }
    }
}

// =============================================================================
// Feed Client
// =============================================================================

/// Client for the exchange ticker stream.
///
/// At most one connection loop runs per client; a second [`run`] call while
/// the first is active returns [`FeedError::AlreadyRunning`].
///
/// [`run`]: UpstreamFeedClient::run
pub struct UpstreamFeedClient {
    config: FeedClientConfig,
    codec: JsonCodec,
    transformer: TickerTransformer,
    subscribe: SubscribeRequest,
    event_tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
    running: AtomicBool,
    connections: AtomicU64,
}

impl UpstreamFeedClient {
    /// Create a new feed client.
    #[must_use]
    pub fn new(
        config: FeedClientConfig,
        event_tx: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let subscribe = SubscribeRequest::tickers(&config.symbols);
        let transformer = TickerTransformer::new(config.quote_asset.clone());

        Self {
            config,
            codec: JsonCodec::new(),
            transformer,
            subscribe,
            event_tx,
            cancel,
            running: AtomicBool::new(false),
            connections: AtomicU64::new(0),
        }
    }

    /// The subscribe request sent on every connection.
    #[must_use]
    pub const fn subscribe_request(&self) -> &SubscribeRequest {
        &self.subscribe
    }

    /// Number of connections opened so far.
    #[must_use]
    pub fn connections_opened(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Whether a connection loop is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run the connection loop until cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::AlreadyRunning`] if another loop is active,
    /// [`FeedError::MaxReconnectAttemptsExceeded`] after emitting
    /// [`FeedEvent::GaveUp`] when a bounded retry policy is exhausted, or
    /// [`FeedError::ChannelClosed`] once the event receiver is gone.
    pub async fn run(self: Arc<Self>) -> Result<(), FeedError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("Upstream feed already running, ignoring connect request");
            return Err(FeedError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        let mut state = ReconnectState::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Upstream feed cancelled");
                return Ok(());
            }

            state.on_connecting();
            match self.connect_and_run(&mut state).await {
                Ok(()) => {
                    tracing::info!("Upstream feed closed on shutdown");
                    return Ok(());
                }
                Err(FeedError::ChannelClosed) => {
                    metrics::set_upstream_connected(false);
                    return Err(FeedError::ChannelClosed);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Upstream connection error");
                    metrics::set_upstream_connected(false);
                    self.emit(FeedEvent::Disconnected).await?;

                    match state.on_disconnected() {
                        RetryDecision::RetryAfter { attempt, delay } => {
                            tracing::info!(
                                attempt,
                                delay_ms = delay.as_millis(),
                                "Reconnecting to upstream feed"
                            );
                            metrics::record_reconnect();
                            self.emit(FeedEvent::Reconnecting { attempt }).await?;

                            tokio::select! {
                                () = self.cancel.cancelled() => {
                                    tracing::info!("Upstream feed cancelled during reconnect delay");
                                    return Ok(());
                                }
                                () = tokio::time::sleep(delay) => {}
                            }
                        }
                        RetryDecision::GiveUp => {
                            tracing::error!(
                                attempts = state.attempt(),
                                "Upstream reconnect attempts exhausted, giving up"
                            );
                            self.emit(FeedEvent::GaveUp).await?;
                            return Err(FeedError::MaxReconnectAttemptsExceeded);
                        }
                    }
                }
            }
        }
    }

    /// Connect, subscribe, and pump frames until error or cancellation.
    async fn connect_and_run(&self, state: &mut ReconnectState) -> Result<(), FeedError> {
        let url = self.config.stream_url();
        tracing::info!(url = %url, symbols = self.config.symbols.len(), "Connecting to upstream feed");

        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = tokio_tungstenite::connect_async(url.as_str()) => result?,
        };

        self.connections.fetch_add(1, Ordering::Relaxed);
        state.on_connected();
        metrics::set_upstream_connected(true);
        tracing::info!("Upstream feed connected");
        self.emit(FeedEvent::Connected).await?;

        let (mut write, mut read) = ws_stream.split();

        let request = self.codec.encode(&self.subscribe)?;
        tracing::debug!(streams = ?self.subscribe.params, "Sending subscribe request");
        write.send(Message::Text(request.into())).await?;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                frame = next_frame(&mut read, self.config.stale_timeout) => {
                    match frame? {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_message(&text).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(frame = ?frame, "Upstream sent close frame");
                            return Err(FeedError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Ignore binary and pong frames
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("Upstream stream ended");
                            return Err(FeedError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Decode, transform, and forward one text frame. Bad frames are
    /// dropped; only a closed event channel fails the link.
    async fn handle_text_message(&self, text: &str) -> Result<(), FeedError> {
        let started = Instant::now();

        match self.codec.decode(text) {
            Ok(UpstreamMessage::Ticker(event)) => {
                metrics::record_upstream_message();
                match self.transformer.transform(&event) {
                    Ok(message) => {
                        self.emit(FeedEvent::Update(message)).await?;
                        metrics::record_processing_duration(started.elapsed());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, symbol = %event.symbol, "Dropping ticker that failed to transform");
                        metrics::record_malformed(DropReason::Transform);
                    }
                }
            }
            Ok(UpstreamMessage::Reply(reply)) => {
                if let Some(error) = reply.error {
                    tracing::error!(code = error.code, msg = %error.msg, "Upstream rejected request");
                    self.emit(FeedEvent::Error(error.msg)).await?;
                } else {
                    tracing::info!(id = ?reply.id, "Upstream subscription confirmed");
                    self.emit(FeedEvent::Subscribed).await?;
                }
            }
            Ok(UpstreamMessage::Other { event_type }) => {
                tracing::trace!(event_type, "Ignoring upstream event");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse upstream message");
                metrics::record_malformed(DropReason::Decode);
            }
        }
        Ok(())
    }

    async fn emit(&self, event: FeedEvent) -> Result<(), FeedError> {
        self.event_tx.send(event).await.map_err(|_| {
            tracing::error!("Feed event receiver dropped, stopping upstream feed");
            FeedError::ChannelClosed
        })
    }
}

/// Clears the running flag when the loop exits, including on panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn next_frame<S>(
    read: &mut S,
    stale_timeout: Option<Duration>,
) -> Result<Option<Result<Message, tungstenite::Error>>, FeedError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    match stale_timeout {
        Some(limit) => tokio::time::timeout(limit, read.next()).await.map_err(|_| {
            tracing::warn!(timeout_secs = limit.as_secs(), "Upstream feed stale, recycling connection");
            FeedError::Stale(limit)
        }),
        None => Ok(read.next().await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(raw: &[&str]) -> Vec<Symbol> {
        raw.iter().map(|s| Symbol::new(s).unwrap()).collect()
    }

    #[test]
    fn stream_url_lists_every_ticker() {
        let config = FeedClientConfig::new(DEFAULT_UPSTREAM_URL, symbols(&["BTCUSDT", "ethusdt"]));
        assert_eq!(
            config.stream_url(),
            "wss://stream.binance.com:9443/ws/btcusdt@ticker/ethusdt@ticker"
        );
    }

    #[test]
    fn stream_url_tolerates_trailing_slash() {
        let config = FeedClientConfig::new("ws://127.0.0.1:9000/ws/", symbols(&["SOLUSDT"]));
        assert_eq!(config.stream_url(), "ws://127.0.0.1:9000/ws/solusdt@ticker");
    }

    #[test]
    fn default_policy_is_fixed_and_unbounded() {
        let config = FeedClientConfig::new(DEFAULT_UPSTREAM_URL, symbols(&["BTCUSDT"]));
        assert!(!config.reconnect.is_bounded());
        assert_eq!(config.reconnect.delay_for(1), DEFAULT_RECONNECT_DELAY);
        assert_eq!(config.reconnect.delay_for(7), DEFAULT_RECONNECT_DELAY);
    }

    #[test]
    fn subscribe_request_built_once_from_symbols() {
        let (tx, _rx) = mpsc::channel(1);
        let client = UpstreamFeedClient::new(
            FeedClientConfig::new(DEFAULT_UPSTREAM_URL, symbols(&["BTCUSDT", "XRPUSDT"])),
            tx,
            CancellationToken::new(),
        );
        assert_eq!(
            client.subscribe_request().params,
            vec!["btcusdt@ticker", "xrpusdt@ticker"]
        );
    }

    #[tokio::test]
    async fn second_run_is_rejected_while_first_is_active() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let mut config = FeedClientConfig::new("ws://127.0.0.1:1", symbols(&["BTCUSDT"]));
        config.reconnect = BackoffConfig::fixed(Duration::from_secs(30));
        let client = Arc::new(UpstreamFeedClient::new(config, tx, cancel.clone()));

        let first = tokio::spawn(Arc::clone(&client).run());

        // Wait until the first loop has failed its connect and is sleeping.
        while let Some(event) = rx.recv().await {
            if matches!(event, FeedEvent::Reconnecting { .. }) {
                break;
            }
        }

        let second = Arc::clone(&client).run().await;
        assert!(matches!(second, Err(FeedError::AlreadyRunning)));

        cancel.cancel();
        assert!(first.await.unwrap().is_ok());
        assert!(!client.is_running());
    }
}
