//! Relay and Watcher Configuration Settings
//!
//! Configuration types for both binaries, loaded from environment variables.
//! Invalid numeric values fall back to their defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::connection::BackoffConfig;
use crate::domain::market::{DEFAULT_HISTORY_CAPACITY, Symbol};
use crate::infrastructure::binance::FeedClientConfig;
use crate::infrastructure::binance::feed::{
    DEFAULT_RECONNECT_DELAY, DEFAULT_STALE_TIMEOUT, DEFAULT_UPSTREAM_URL,
};
use crate::infrastructure::client::ClientReconnectorConfig;
use crate::infrastructure::relay::RelayServerConfig;
use crate::infrastructure::relay::registry::DEFAULT_QUEUE_CAPACITY;
use crate::infrastructure::storage::DEFAULT_PREFERENCES_PATH;

/// Symbols relayed when `CRYPTOPULSE_SYMBOLS` is unset.
pub const DEFAULT_SYMBOLS: [&str; 10] = [
    "BTCUSDT", "ETHUSDT", "BNBUSDT", "ADAUSDT", "XRPUSDT", "SOLUSDT", "DOTUSDT", "DOGEUSDT",
    "AVAXUSDT", "MATICUSDT",
];

/// Deployment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Local development: CORS for the dev client, no static files.
    #[default]
    Development,
    /// Production: serve the presentation bundle, no CORS.
    Production,
}

impl Environment {
    /// Parse environment from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    /// Check if this is production.
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Get the environment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Upstream exchange settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Stream base URL.
    pub url: String,
    /// Symbols to relay.
    pub symbols: Vec<Symbol>,
    /// Quote asset stripped on the wire.
    pub quote_asset: String,
    /// Fixed delay between reconnects.
    pub reconnect_delay: Duration,
    /// Silence after which the link is recycled (zero disables).
    pub stale_timeout: Duration,
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Relay HTTP/WebSocket port.
    pub port: u16,
    /// Presentation bundle directory.
    pub static_dir: PathBuf,
    /// Dev client origin allowed by CORS.
    pub client_url: String,
    /// Per-subscriber queue capacity.
    pub queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 5000,
            static_dir: PathBuf::from("client/dist"),
            client_url: "http://localhost:5173".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Deployment mode.
    pub environment: Environment,
    /// Upstream exchange settings.
    pub upstream: UpstreamSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol list is empty or contains an invalid
    /// symbol.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol list is empty or contains an invalid
    /// symbol.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = lookup("CRYPTOPULSE_ENV")
            .or_else(|| lookup("NODE_ENV"))
            .map(|s| Environment::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let symbols = match lookup("CRYPTOPULSE_SYMBOLS") {
            Some(raw) => parse_symbols(&raw)?,
            None => DEFAULT_SYMBOLS
                .iter()
                .map(|s| Symbol::new(s))
                .collect::<Result<_, _>>()
                .map_err(|e| ConfigError::InvalidSymbol(e.to_string()))?,
        };

        let upstream = UpstreamSettings {
            url: lookup("UPSTREAM_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string()),
            symbols,
            quote_asset: lookup("QUOTE_ASSET")
                .filter(|v| !v.trim().is_empty())
                .map_or_else(|| "USDT".to_string(), |v| v.trim().to_uppercase()),
            reconnect_delay: parse_duration_millis(
                &lookup,
                "UPSTREAM_RECONNECT_DELAY_MS",
                DEFAULT_RECONNECT_DELAY,
            ),
            stale_timeout: parse_duration_secs(
                &lookup,
                "UPSTREAM_STALE_TIMEOUT_SECS",
                DEFAULT_STALE_TIMEOUT,
            ),
        };

        let defaults = ServerSettings::default();
        let server = ServerSettings {
            port: parse_or(&lookup, "PORT", defaults.port),
            static_dir: lookup("STATIC_DIR").map_or(defaults.static_dir, PathBuf::from),
            client_url: lookup("CLIENT_URL").unwrap_or(defaults.client_url),
            queue_capacity: parse_or(&lookup, "SUBSCRIBER_QUEUE_CAPACITY", defaults.queue_capacity),
        };

        Ok(Self {
            environment,
            upstream,
            server,
        })
    }

    /// Symbols as plain strings.
    #[must_use]
    pub fn symbol_names(&self) -> Vec<String> {
        self.upstream
            .symbols
            .iter()
            .map(|s| s.as_str().to_string())
            .collect()
    }

    /// Feed client configuration.
    #[must_use]
    pub fn feed_config(&self) -> FeedClientConfig {
        let mut config =
            FeedClientConfig::new(self.upstream.url.clone(), self.upstream.symbols.clone());
        config.quote_asset.clone_from(&self.upstream.quote_asset);
        config.reconnect = BackoffConfig::fixed(self.upstream.reconnect_delay);
        config.stale_timeout =
            (!self.upstream.stale_timeout.is_zero()).then_some(self.upstream.stale_timeout);
        config
    }

    /// Relay server configuration for the current environment.
    #[must_use]
    pub fn server_config(&self) -> RelayServerConfig {
        let production = self.environment.is_production();

        RelayServerConfig {
            port: self.server.port,
            version: env!("CARGO_PKG_VERSION").to_string(),
            static_dir: production.then(|| self.server.static_dir.clone()),
            cors_origin: (!production).then(|| self.server.client_url.clone()),
        }
    }
}

/// Complete watcher configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay WebSocket URL.
    pub relay_url: String,
    /// Backoff base delay.
    pub base_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Retry bound.
    pub max_attempts: u32,
    /// Price points kept per symbol.
    pub history_capacity: usize,
    /// Preferences file.
    pub preferences_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://localhost:5000".to_string(),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            preferences_path: PathBuf::from(DEFAULT_PREFERENCES_PATH),
        }
    }
}

impl ClientConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            relay_url: lookup("RELAY_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.relay_url),
            base_delay: parse_duration_millis(&lookup, "RECONNECT_BASE_MS", defaults.base_delay),
            max_delay: parse_duration_millis(&lookup, "RECONNECT_MAX_DELAY_MS", defaults.max_delay),
            // Always bounded; 0 falls back to the default
            max_attempts: lookup("RECONNECT_MAX_ATTEMPTS")
                .and_then(|v| v.trim().parse().ok())
                .filter(|&n: &u32| n > 0)
                .unwrap_or(defaults.max_attempts),
            history_capacity: parse_or(&lookup, "HISTORY_CAPACITY", defaults.history_capacity),
            preferences_path: lookup("PREFERENCES_PATH")
                .map_or(defaults.preferences_path, PathBuf::from),
        }
    }

    /// Reconnecting client configuration.
    #[must_use]
    pub fn reconnector_config(&self) -> ClientReconnectorConfig {
        let mut config = ClientReconnectorConfig::new(self.relay_url.clone());
        config.backoff =
            BackoffConfig::exponential(self.base_delay, self.max_delay, self.max_attempts);
        config.history_capacity = self.history_capacity;
        config
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Symbol list is empty.
    #[error("CRYPTOPULSE_SYMBOLS must list at least one symbol")]
    NoSymbols,
    /// Symbol is malformed.
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),
}

fn parse_symbols(raw: &str) -> Result<Vec<Symbol>, ConfigError> {
    let mut symbols: Vec<Symbol> = Vec::new();

    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let symbol = Symbol::new(part).map_err(|e| ConfigError::InvalidSymbol(e.to_string()))?;
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }

    if symbols.is_empty() {
        return Err(ConfigError::NoSymbols);
    }
    Ok(symbols)
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

fn parse_duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}
