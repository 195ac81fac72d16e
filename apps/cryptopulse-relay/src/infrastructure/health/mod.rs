//! Health Check and Metrics Endpoints
//!
//! HTTP routes for health checks, upstream status reporting, and Prometheus
//! metrics. Merged into the relay router so everything shares one port.
//!
//! # Endpoints
//!
//! - `GET /api/health` - Simple status for the presentation bundle
//! - `GET /health` - Returns detailed JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (upstream connected)
//! - `GET /metrics` - Prometheus metrics in text format

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::connection::ConnectionStatus;
use crate::infrastructure::binance::FeedEvent;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::relay::registry::SharedRegistry;

// =============================================================================
// Upstream State Tracking
// =============================================================================

/// Tracks the state of the upstream feed connection.
#[derive(Debug)]
pub struct UpstreamState {
    status: parking_lot::RwLock<ConnectionStatus>,
    last_connected_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
    error_message: parking_lot::RwLock<Option<String>>,
    reconnect_attempts: AtomicU64,
    messages_received: AtomicU64,
}

impl Default for UpstreamState {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamState {
    /// Create state for a link that has not connected yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: parking_lot::RwLock::new(ConnectionStatus::Connecting),
            last_connected_at: parking_lot::RwLock::new(None),
            error_message: parking_lot::RwLock::new(None),
            reconnect_attempts: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
        }
    }

    /// Fold one feed event into the state.
    pub fn observe(&self, event: &FeedEvent) {
        match event {
            FeedEvent::Connected => {
                *self.status.write() = ConnectionStatus::Connected;
                *self.last_connected_at.write() = Some(Utc::now());
                *self.error_message.write() = None;
            }
            FeedEvent::Disconnected => *self.status.write() = ConnectionStatus::Disconnected,
            FeedEvent::Reconnecting { .. } => {
                *self.status.write() = ConnectionStatus::Connecting;
                self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
            }
            FeedEvent::Update(_) => {
                self.messages_received.fetch_add(1, Ordering::Relaxed);
            }
            FeedEvent::Subscribed => {}
            FeedEvent::Error(msg) => *self.error_message.write() = Some(msg.clone()),
            FeedEvent::GaveUp => *self.status.write() = ConnectionStatus::GaveUp,
        }
    }

    /// Current link status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    /// Whether the link is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Ticker updates forwarded so far.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Reconnects scheduled so far.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Health Response Types
// =============================================================================

/// Simple status body served at `/api/health`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiHealth {
    /// Always "OK".
    pub status: &'static str,
    /// Current time.
    pub timestamp: DateTime<Utc>,
    /// Human-readable message.
    pub message: &'static str,
}

/// Detailed health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream connection status.
    pub upstream: UpstreamInfo,
    /// Subscriber statistics.
    pub subscribers: SubscriberInfo,
    /// Configured symbols.
    pub symbols: Vec<String>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Upstream connected.
    Healthy,
    /// Upstream reconnecting; subscribers stay connected.
    Degraded,
    /// Upstream abandoned.
    Unhealthy,
}

/// Upstream link status.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamInfo {
    /// Connection state.
    pub state: ConnectionStatus,
    /// Whether the link is open.
    pub connected: bool,
    /// Ticker updates forwarded.
    pub messages_received: u64,
    /// Reconnects scheduled since start.
    pub reconnect_attempts: u64,
    /// When the link last opened.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Last error reported by the exchange.
    pub error: Option<String>,
}

/// Subscriber statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberInfo {
    /// Connected subscribers.
    pub connected: usize,
    /// Frames queued since start.
    pub delivered: u64,
    /// Frames dropped for slow subscribers.
    pub dropped: u64,
}

// =============================================================================
// Health State
// =============================================================================

/// Shared state for the health routes.
pub struct HealthState {
    version: String,
    started_at: Instant,
    upstream: Arc<UpstreamState>,
    registry: SharedRegistry,
    symbols: Vec<String>,
}

impl HealthState {
    /// Create new health state.
    #[must_use]
    pub fn new(
        version: String,
        upstream: Arc<UpstreamState>,
        registry: SharedRegistry,
        symbols: Vec<String>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            upstream,
            registry,
            symbols,
        }
    }
}

/// Build the health and metrics routes.
pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/api/health", get(api_health_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn api_health_handler() -> impl IntoResponse {
    Json(ApiHealth {
        status: "OK",
        timestamp: Utc::now(),
        message: "CryptoPulse API is running",
    })
}

async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    if state.upstream.is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthState) -> HealthResponse {
    let upstream = upstream_info(&state.upstream);
    let stats = state.registry.stats();

    HealthResponse {
        status: determine_health_status(upstream.state),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        upstream,
        subscribers: SubscriberInfo {
            connected: stats.subscribers,
            delivered: stats.delivered_total,
            dropped: stats.dropped_total,
        },
        symbols: state.symbols.clone(),
    }
}

fn upstream_info(state: &UpstreamState) -> UpstreamInfo {
    let status = state.status();

    UpstreamInfo {
        state: status,
        connected: status == ConnectionStatus::Connected,
        messages_received: state.messages_received(),
        reconnect_attempts: state.reconnect_attempts(),
        last_connected_at: *state.last_connected_at.read(),
        error: state.error_message.read().clone(),
    }
}

const fn determine_health_status(status: ConnectionStatus) -> HealthStatus {
    match status {
        ConnectionStatus::Connected => HealthStatus::Healthy,
        ConnectionStatus::Connecting | ConnectionStatus::Disconnected => HealthStatus::Degraded,
        ConnectionStatus::GaveUp => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::infrastructure::relay::registry::SubscriberRegistry;

    fn state() -> (Arc<HealthState>, Arc<UpstreamState>) {
        let upstream = Arc::new(UpstreamState::new());
        let state = Arc::new(HealthState::new(
            "0.0.0-test".to_string(),
            Arc::clone(&upstream),
            Arc::new(SubscriberRegistry::default()),
            vec!["BTCUSDT".to_string()],
        ));
        (state, upstream)
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }

    #[test]
    fn determine_status_by_link_state() {
        assert_eq!(
            determine_health_status(ConnectionStatus::Connected),
            HealthStatus::Healthy
        );
        assert_eq!(
            determine_health_status(ConnectionStatus::Disconnected),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(ConnectionStatus::GaveUp),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn upstream_state_folds_events() {
        let upstream = UpstreamState::new();
        upstream.observe(&FeedEvent::Connected);
        assert!(upstream.is_connected());

        upstream.observe(&FeedEvent::Disconnected);
        upstream.observe(&FeedEvent::Reconnecting { attempt: 1 });
        assert_eq!(upstream.status(), ConnectionStatus::Connecting);
        assert_eq!(upstream.reconnect_attempts(), 1);

        upstream.observe(&FeedEvent::Error("Invalid request".to_string()));
        assert_eq!(
            upstream_info(&upstream).error.as_deref(),
            Some("Invalid request")
        );
    }

    #[tokio::test]
    async fn api_health_reports_ok() {
        let (state, _) = state();
        let (status, body) = get_body(router(state), "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "OK");
        assert_eq!(json["message"], "CryptoPulse API is running");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn readiness_follows_upstream() {
        let (state, upstream) = state();

        let (status, _) = get_body(router(Arc::clone(&state)), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        upstream.observe(&FeedEvent::Connected);
        let (status, body) = get_body(router(state), "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "READY");
    }

    #[tokio::test]
    async fn exhausted_feed_reports_unhealthy() {
        let (state, upstream) = state();
        upstream.observe(&FeedEvent::Disconnected);
        upstream.observe(&FeedEvent::GaveUp);
        assert_eq!(upstream.status(), ConnectionStatus::GaveUp);

        let (status, body) = get_body(router(state), "/health").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["upstream"]["state"], "gave_up");
    }

    #[tokio::test]
    async fn detailed_health_lists_symbols() {
        let (state, _) = state();
        let (status, body) = get_body(router(state), "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["upstream"]["state"], "connecting");
        assert_eq!(json["symbols"][0], "BTCUSDT");
        assert_eq!(json["subscribers"]["connected"], 0);
    }
}
