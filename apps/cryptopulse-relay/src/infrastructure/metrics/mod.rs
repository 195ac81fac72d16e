//! Prometheus Metrics Module
//!
//! Exposes relay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Upstream**: Frames received, malformed frames, reconnects, link state
//! - **Fan-out**: Deliveries, failed deliveries, slow-subscriber drops
//! - **Subscribers**: Connected subscriber count
//! - **Latency**: Upstream frame processing time
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the relay port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Upstream
    describe_counter!(
        "cryptopulse_upstream_messages_total",
        "Total ticker events received from the exchange"
    );
    describe_counter!(
        "cryptopulse_upstream_malformed_total",
        "Total upstream frames dropped as malformed"
    );
    describe_counter!(
        "cryptopulse_upstream_reconnects_total",
        "Total upstream reconnection attempts"
    );
    describe_gauge!(
        "cryptopulse_upstream_connected",
        "Whether the upstream link is open (0 or 1)"
    );

    // Fan-out
    describe_counter!(
        "cryptopulse_messages_delivered_total",
        "Total messages queued to subscribers"
    );
    describe_counter!(
        "cryptopulse_deliveries_failed_total",
        "Total deliveries to closed subscribers"
    );
    describe_counter!(
        "cryptopulse_slow_subscriber_drops_total",
        "Total messages dropped because a subscriber queue was full"
    );
    describe_gauge!(
        "cryptopulse_subscribers",
        "Number of connected subscribers"
    );

    // Latency
    describe_histogram!(
        "cryptopulse_upstream_processing_seconds",
        "Time from upstream frame receipt to broadcast"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Reasons an upstream frame was dropped.
#[derive(Debug, Clone, Copy)]
pub enum DropReason {
    /// Frame was not valid JSON or missed fields.
    Decode,
    /// Ticker fields did not transform.
    Transform,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Transform => "transform",
        }
    }
}

/// Record a ticker event received from the exchange.
pub fn record_upstream_message() {
    counter!("cryptopulse_upstream_messages_total").increment(1);
}

/// Record an upstream frame dropped as malformed.
pub fn record_malformed(reason: DropReason) {
    counter!(
        "cryptopulse_upstream_malformed_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record an upstream reconnection attempt.
pub fn record_reconnect() {
    counter!("cryptopulse_upstream_reconnects_total").increment(1);
}

/// Update the upstream link state.
pub fn set_upstream_connected(connected: bool) {
    gauge!("cryptopulse_upstream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record messages queued to subscribers.
pub fn record_delivered(count: u64) {
    counter!("cryptopulse_messages_delivered_total").increment(count);
}

/// Record deliveries that failed because the subscriber was gone.
pub fn record_delivery_failed(count: u64) {
    counter!("cryptopulse_deliveries_failed_total").increment(count);
}

/// Record messages dropped for slow subscribers.
pub fn record_slow_drops(count: u64) {
    counter!("cryptopulse_slow_subscriber_drops_total").increment(count);
}

/// Update the subscriber count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribers(count: usize) {
    gauge!("cryptopulse_subscribers").set(count as f64);
}

/// Record upstream frame processing duration.
pub fn record_processing_duration(duration: Duration) {
    histogram!("cryptopulse_upstream_processing_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
