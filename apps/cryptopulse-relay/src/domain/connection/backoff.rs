//! Retry Delay Policy
//!
//! Computes the delay before reconnection attempt `n`. The same type covers
//! both links: the upstream feed retries on a fixed interval forever, while
//! subscribers back off exponentially up to a bounded number of attempts.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection delays.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay unit; attempt `n` waits `base_delay * multiplier^n`.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor per attempt (1.0 = fixed delay).
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Maximum number of reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1), Duration::from_secs(30), 5)
    }
}

impl BackoffConfig {
    /// Constant delay between attempts, retrying forever.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        }
    }

    /// Doubling delay capped at `max_delay`, giving up after `max_attempts`.
    #[must_use]
    pub const fn exponential(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    /// Return a copy with the given jitter factor.
    #[must_use]
    pub const fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    /// Whether the attempt count is bounded.
    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.max_attempts > 0
    }

    /// Delay before attempt `attempt` (1-based), without jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let scaled = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let max_millis = self.max_delay.as_millis();

        let millis = if scaled.is_finite() && scaled >= 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                (scaled.round() as u128).min(max_millis)
            }
        } else {
            max_millis
        };

        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Delay before attempt `attempt` with jitter applied.
    #[must_use]
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        apply_jitter(self.delay_for(attempt), self.jitter_factor)
    }
}

fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    #[allow(clippy::cast_precision_loss)]
    let base_millis = duration.as_millis() as f64;
    let jitter_range = base_millis * jitter_factor;
    let mut rng = rand::rng();
    let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
    let adjusted_millis = (base_millis + jitter).max(1.0);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let adjusted_u64 = adjusted_millis as u64;
    Duration::from_millis(adjusted_u64)
}
