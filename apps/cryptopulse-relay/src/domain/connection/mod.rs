//! Connection State Machine
//!
//! Tracks one link's lifecycle:
//!
//! ```text
//! Connecting ──► Connected ──► Disconnected ──► Connecting
//!      │                            │
//!      └──────── (failed) ──────────┘──► GaveUp (terminal)
//! ```
//!
//! [`ReconnectState`] owns the attempt counter. It is reset on every
//! successful connect and never exceeds the configured bound; once the bound
//! is reached the next disconnect moves to [`ConnectionStatus::GaveUp`] and no
//! further retry is scheduled until [`ReconnectState::restart`] is called.

pub mod backoff;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use backoff::BackoffConfig;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Handshake in progress.
    Connecting,
    /// Handshake completed, messages flowing.
    Connected,
    /// Transport closed or failed; a retry may be pending.
    Disconnected,
    /// Retry budget exhausted; automatic recovery has stopped.
    GaveUp,
}

impl ConnectionStatus {
    /// Status name for logs and health output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::GaveUp => "gave_up",
        }
    }

    /// Whether this status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::GaveUp)
    }
}

/// What to do after a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule reconnection attempt `attempt` after `delay`.
    RetryAfter {
        /// 1-based attempt number.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// Retry budget exhausted.
    GiveUp,
}

/// Attempt counter and status for one reconnecting link.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    config: BackoffConfig,
    status: ConnectionStatus,
    attempt: u32,
}

impl ReconnectState {
    /// Create a state machine in `Connecting` with zero attempts.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            status: ConnectionStatus::Connecting,
            attempt: 0,
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Number of retries scheduled since the last successful connect.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Configured retry bound (0 = unlimited).
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Backoff configuration in use.
    #[must_use]
    pub const fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// A scheduled retry is firing.
    ///
    /// Ignored once the state machine has given up.
    pub const fn on_connecting(&mut self) {
        if !self.status.is_terminal() {
            self.status = ConnectionStatus::Connecting;
        }
    }

    /// Handshake succeeded: reset the attempt counter.
    pub const fn on_connected(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.attempt = 0;
    }

    /// Transport closed, errored, or the connect attempt failed.
    ///
    /// Returns the retry to schedule, or [`RetryDecision::GiveUp`] when the
    /// bound has been reached. Calling this after giving up keeps returning
    /// `GiveUp`.
    pub fn on_disconnected(&mut self) -> RetryDecision {
        if self.status.is_terminal() {
            return RetryDecision::GiveUp;
        }

        if self.config.is_bounded() && self.attempt >= self.config.max_attempts {
            self.status = ConnectionStatus::GaveUp;
            return RetryDecision::GiveUp;
        }

        self.status = ConnectionStatus::Disconnected;
        self.attempt = self.attempt.saturating_add(1);
        RetryDecision::RetryAfter {
            attempt: self.attempt,
            delay: self.config.jittered_delay_for(self.attempt),
        }
    }

    /// Manual reconnect: clear the counter and start over from `Connecting`.
    pub const fn restart(&mut self) {
        self.status = ConnectionStatus::Connecting;
        self.attempt = 0;
    }
}
