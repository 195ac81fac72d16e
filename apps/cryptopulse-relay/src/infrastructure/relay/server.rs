//! Relay Server
//!
//! HTTP and WebSocket front of the relay. A WebSocket upgrade on `/`
//! registers a subscriber; the socket task drains that subscriber's queue
//! until either side closes, then unregisters it.
//!
//! ```text
//! UpstreamFeedClient ──FeedEvent──► forward_feed_events ──broadcast──► SubscriberRegistry
//!                                                                        │
//!                                         subscriber queue ◄─────────────┘
//!                                                │
//!                                          socket task ──► WebSocket
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        Request, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use super::registry::{Frame, SharedRegistry};
use crate::infrastructure::binance::FeedEvent;
use crate::infrastructure::health::{self, HealthState, UpstreamState};
use crate::infrastructure::metrics;

/// Longest a single frame write to a subscriber may take.
pub const SUBSCRIBER_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the relay server.
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// Listen port.
    pub port: u16,
    /// Relay version string.
    pub version: String,
    /// Presentation bundle served in production.
    pub static_dir: Option<PathBuf>,
    /// Allowed browser origin; `None` sends no CORS headers.
    pub cors_origin: Option<String>,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            version: env!("CARGO_PKG_VERSION").to_string(),
            static_dir: None,
            cors_origin: None,
        }
    }
}

// =============================================================================
// Server
// =============================================================================

struct RelayState {
    registry: SharedRegistry,
    index: Option<PathBuf>,
    cancel: CancellationToken,
}

/// HTTP and WebSocket server fanning ticker updates out to subscribers.
pub struct RelayServer {
    config: RelayServerConfig,
    registry: SharedRegistry,
    upstream: Arc<UpstreamState>,
    symbols: Vec<String>,
    cancel: CancellationToken,
}

impl RelayServer {
    /// Create a new relay server.
    #[must_use]
    pub fn new(
        config: RelayServerConfig,
        registry: SharedRegistry,
        symbols: Vec<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry,
            upstream: Arc::new(UpstreamState::new()),
            symbols,
            cancel,
        }
    }

    /// Upstream state shared with the feed event pump.
    #[must_use]
    pub fn upstream_state(&self) -> Arc<UpstreamState> {
        Arc::clone(&self.upstream)
    }

    /// Subscriber registry.
    #[must_use]
    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Build the full application router.
    pub fn router(&self) -> Router {
        let health_state = Arc::new(HealthState::new(
            self.config.version.clone(),
            Arc::clone(&self.upstream),
            Arc::clone(&self.registry),
            self.symbols.clone(),
        ));

        let index = self.config.static_dir.as_ref().map(|dir| dir.join("index.html"));
        let relay_state = Arc::new(RelayState {
            registry: Arc::clone(&self.registry),
            index: index.clone(),
            cancel: self.cancel.clone(),
        });

        let mut app = Router::new()
            .route("/", get(ws_handler))
            .with_state(relay_state)
            .merge(health::router(health_state));

        if let (Some(dir), Some(index)) = (&self.config.static_dir, index) {
            tracing::info!(dir = %dir.display(), "Serving static files");
            app = app.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)));
        }

        if let Some(cors) = self.config.cors_origin.as_deref().and_then(cors_layer) {
            app = app.layer(cors);
        }

        app.layer(TraceLayer::new_for_http())
    }

    /// Bind the configured port and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `RelayServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), RelayServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayServerError::BindFailed(self.config.port, e.to_string()))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `RelayServerError` if the HTTP server fails while running.
    pub async fn serve(self, listener: TcpListener) -> Result<(), RelayServerError> {
        let app = self.router();
        let local = listener
            .local_addr()
            .map_err(|e| RelayServerError::ServerFailed(e.to_string()))?;

        tracing::info!(addr = %local, "Relay server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| RelayServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Relay server stopped");
        Ok(())
    }
}

fn cors_layer(origin: &str) -> Option<CorsLayer> {
    match HeaderValue::from_str(origin) {
        Ok(origin) => Some(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST]),
        ),
        Err(e) => {
            tracing::warn!(origin, error = %e, "Ignoring invalid CORS origin");
            None
        }
    }
}

// =============================================================================
// Feed Event Pump
// =============================================================================

/// Forward upstream feed events to subscribers until the feed channel closes.
pub async fn forward_feed_events(
    mut rx: mpsc::Receiver<FeedEvent>,
    registry: SharedRegistry,
    upstream: Arc<UpstreamState>,
) {
    while let Some(event) = rx.recv().await {
        upstream.observe(&event);

        match event {
            FeedEvent::Update(message) => {
                if let Err(e) = registry.broadcast(&message) {
                    tracing::error!(error = %e, "Failed to serialize price update");
                }
            }
            FeedEvent::Connected => {
                tracing::info!(subscribers = registry.len(), "Upstream feed live");
            }
            FeedEvent::Disconnected => {
                tracing::warn!(subscribers = registry.len(), "Upstream feed lost, subscribers kept");
            }
            FeedEvent::Reconnecting { attempt } => {
                tracing::debug!(attempt, "Upstream feed reconnecting");
            }
            FeedEvent::Subscribed => {
                tracing::debug!("Upstream subscription active");
            }
            FeedEvent::Error(msg) => {
                tracing::error!(error = %msg, "Upstream feed error");
            }
            FeedEvent::GaveUp => {
                tracing::error!(subscribers = registry.len(), "Upstream feed gave up, relay is stale");
            }
        }
    }

    tracing::debug!("Feed event channel closed");
}

// =============================================================================
// WebSocket Handling
// =============================================================================

async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<RelayState>>,
    request: Request,
) -> Response {
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state)),
        Err(rejection) => match &state.index {
            Some(index) => match ServeFile::new(index).oneshot(request).await {
                Ok(response) => response.into_response(),
                Err(never) => match never {},
            },
            None => rejection.into_response(),
        },
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let (id, mut rx) = state.registry.register_new();
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        let exit = write_frames(&mut rx, &mut sender, SUBSCRIBER_WRITE_TIMEOUT).await;
        tracing::debug!(subscriber = %id, exit = ?exit, "Subscriber writer stopped");
        if exit != WriterExit::TimedOut {
            let _ = sender.close().await;
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {
                    // Subscribers have nothing to say; inbound frames are ignored
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Subscriber socket error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
        () = state.cancel.cancelled() => {
            recv_task.abort();
            send_task.abort();
        }
    }

    state.registry.unregister(id);
}

/// Why a subscriber's writer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterExit {
    /// The registry dropped the queue.
    QueueClosed,
    /// The socket rejected a write.
    SendFailed,
    /// A write did not complete within the timeout.
    TimedOut,
}

/// Copy queued frames to the socket until the queue closes, a write fails,
/// or one write stalls past `write_timeout`.
async fn write_frames<S>(
    rx: &mut mpsc::Receiver<Frame>,
    sink: &mut S,
    write_timeout: Duration,
) -> WriterExit
where
    S: Sink<Message> + Unpin,
{
    while let Some(frame) = rx.recv().await {
        let write = sink.send(Message::Text(frame.to_string().into()));
        match tokio::time::timeout(write_timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return WriterExit::SendFailed,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = write_timeout.as_millis(),
                    "Subscriber write stalled, disconnecting"
                );
                metrics::record_delivery_failed(1);
                return WriterExit::TimedOut;
            }
        }
    }
    WriterExit::QueueClosed
}

// =============================================================================
// Errors
// =============================================================================

/// Relay server errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
