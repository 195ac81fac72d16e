#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! CryptoPulse Relay - Live Ticker Multiplexer
//!
//! Keeps a single connection to the exchange's 24h ticker stream, normalizes
//! each update, and fans it out to any number of WebSocket subscribers. The
//! same crate ships the subscriber side: a reconnecting client that keeps a
//! market view and the user's preferences.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `market`: Symbols, ticker snapshots, price history
//!   - `connection`: Connection status, backoff, reconnect state machine
//!   - `preferences`: Favorites and theme
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Preferences storage interface
//!   - `services`: Market view, preferences with write-through persistence
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: Upstream ticker stream client
//!   - `relay`: Transform, subscriber registry, HTTP/WebSocket server
//!   - `client`: Reconnecting relay subscriber
//!   - `storage`: JSON file preferences store
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                  ┌─────────────┐     ┌────────────┐     ┌────────────┐
//! Exchange WS ────►│  Upstream   │────►│   Ticker   │────►│ Subscriber │──► Subscriber 1
//!  (1 socket)      │ Feed Client │     │ Transformer│     │  Registry  │──► Subscriber 2
//!                  └─────────────┘     └────────────┘     └────────────┘──► Subscriber N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{BackoffConfig, ConnectionStatus, ReconnectState, RetryDecision};
pub use domain::market::{Symbol, TickerSnapshot, TradeCount};
pub use domain::preferences::{Preferences, Theme};

// Application services
pub use application::services::{MarketView, Notice, PreferencesService, Updated};

// Infrastructure config
pub use infrastructure::config::{ClientConfig, ConfigError, Environment, RelayConfig};

// Upstream feed
pub use infrastructure::binance::{FeedClientConfig, FeedError, FeedEvent, UpstreamFeedClient};

// Relay
pub use infrastructure::relay::{
    RelayServer, RelayServerConfig, SubscriberId, SubscriberRegistry, TickerTransformer,
    WireMessage, forward_feed_events,
};

// Subscriber client
pub use infrastructure::client::{ClientEvent, ClientReconnector, ClientReconnectorConfig};

// Storage
pub use infrastructure::storage::JsonFilePreferencesStore;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
