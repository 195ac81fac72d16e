//! Configuration Module
//!
//! Environment-driven configuration for the relay and the watcher.

mod settings;

pub use settings::{
    ClientConfig, ConfigError, DEFAULT_SYMBOLS, Environment, RelayConfig, ServerSettings,
    UpstreamSettings,
};
