//! CryptoPulse Relay Binary
//!
//! Starts the ticker relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin cryptopulse-relay
//! ```
//!
//! # Environment Variables
//!
//! - `CRYPTOPULSE_ENV` / `NODE_ENV`: development | production (default: development)
//! - `PORT`: HTTP/WebSocket port (default: 5000)
//! - `CLIENT_URL`: Dev client origin allowed by CORS (default: <http://localhost:5173>)
//! - `STATIC_DIR`: Presentation bundle served in production (default: client/dist)
//! - `UPSTREAM_URL`: Exchange stream base URL
//! - `CRYPTOPULSE_SYMBOLS`: Comma-separated pairs (default: 10 USDT pairs)
//! - `QUOTE_ASSET`: Quote asset stripped on the wire (default: USDT)
//! - `UPSTREAM_RECONNECT_DELAY_MS`: Upstream retry delay (default: 5000)
//! - `UPSTREAM_STALE_TIMEOUT_SECS`: Upstream silence limit, 0 disables (default: 60)
//! - `SUBSCRIBER_QUEUE_CAPACITY`: Per-subscriber queue length (default: 256)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use cryptopulse_relay::infrastructure::telemetry;
use cryptopulse_relay::{
    FeedEvent, RelayConfig, RelayServer, SubscriberRegistry, UpstreamFeedClient,
    forward_feed_events, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Feed event channel depth.
const FEED_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP export)
    let _telemetry_guard = telemetry::init("cryptopulse-relay")?;

    tracing::info!("Starting CryptoPulse relay");

    let _metrics_handle = init_metrics()?;

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let registry = Arc::new(SubscriberRegistry::new(config.server.queue_capacity));
    let server = RelayServer::new(
        config.server_config(),
        Arc::clone(&registry),
        config.symbol_names(),
        shutdown_token.clone(),
    );

    let (feed_tx, feed_rx) = mpsc::channel::<FeedEvent>(FEED_CHANNEL_CAPACITY);
    let feed_client = Arc::new(UpstreamFeedClient::new(
        config.feed_config(),
        feed_tx,
        shutdown_token.clone(),
    ));

    // Spawn feed event pump
    let pump_registry = Arc::clone(&registry);
    let upstream_state = server.upstream_state();
    let pump = tokio::spawn(async move {
        forward_feed_events(feed_rx, pump_registry, upstream_state).await;
    });

    // Spawn upstream client
    tokio::spawn(async move {
        if let Err(e) = feed_client.run().await {
            tracing::error!(error = %e, "Upstream feed client error");
        }
    });

    // Spawn relay server
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "Relay server error");
        }
    });

    tracing::info!("Relay ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = server_task.await;
        let _ = pump.await;
    })
    .await
    .is_err()
    {
        tracing::warn!("Graceful shutdown timed out");
    }

    tracing::info!("Relay stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        environment = config.environment.as_str(),
        port = config.server.port,
        symbols = config.upstream.symbols.len(),
        queue_capacity = config.server.queue_capacity,
        "Configuration loaded"
    );
    tracing::debug!(
        upstream_url = %config.feed_config().stream_url(),
        reconnect_delay_ms = config.upstream.reconnect_delay.as_millis(),
        "Upstream endpoint"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
