//! Domain Layer - Core ticker types and connection state.
//!
//! This layer contains the core domain types for the relay and its
//! subscribers with no I/O. Everything here is plain Rust with
//! serialization support.

/// Ticker snapshots, per-symbol book, and bounded price history.
pub mod market;

/// Connection status and the reconnect state machine.
pub mod connection;

/// Favorite symbols and display theme.
pub mod preferences;
