//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the network edges of both binaries.

/// Exchange ticker stream client (single upstream connection).
pub mod binance;

/// Wire format, ticker transform, subscriber registry, and relay server.
pub mod relay;

/// Reconnecting relay subscriber.
pub mod client;

/// JSON file preferences store.
pub mod storage;

/// Configuration loaded from the environment.
pub mod config;

/// Health check HTTP endpoints.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
