//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `PreferencesStore`: Local key-value persistence for favorites and theme

use async_trait::async_trait;

use crate::domain::preferences::Preferences;

/// Errors raised by a preferences store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying storage could not be read or written.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be encoded or decoded.
    #[error("preferences encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Persistence for user preferences.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreferencesStore: Send + Sync {
    /// Load saved preferences, or `None` if nothing has been saved yet.
    async fn load(&self) -> Result<Option<Preferences>, StoreError>;

    /// Persist the given preferences, replacing what was stored.
    async fn save(&self, preferences: &Preferences) -> Result<(), StoreError>;
}
