//! Favorites and theme with write-through persistence.
//!
//! The in-memory [`Preferences`] are authoritative. Every toggle is written
//! to the store immediately; a failed write does not roll the change back,
//! it surfaces a [`Notice`] for the user instead.

use std::fmt;

use crate::application::ports::PreferencesStore;
use crate::domain::preferences::{Preferences, Theme};

/// Transient message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Preferences could not be persisted.
    SaveFailed {
        /// Underlying error.
        reason: String,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SaveFailed { .. } => f.write_str("Failed to save favorites"),
        }
    }
}

/// Result of a preferences change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Updated<T> {
    /// The new value.
    pub value: T,
    /// Set when the change could not be persisted.
    pub notice: Option<Notice>,
}

/// Owns the user's preferences and writes them through to a store.
pub struct PreferencesService<S> {
    store: S,
    preferences: Preferences,
}

impl<S: PreferencesStore> PreferencesService<S> {
    /// Load preferences from the store.
    ///
    /// Missing or unreadable preferences fall back to defaults.
    pub async fn load(store: S) -> Self {
        let preferences = match store.load().await {
            Ok(Some(preferences)) => preferences,
            Ok(None) => Preferences::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load preferences, using defaults");
                Preferences::default()
            }
        };

        Self { store, preferences }
    }

    /// Current preferences.
    #[must_use]
    pub const fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// Add or remove a favorite symbol and persist the change.
    pub async fn toggle_favorite(&mut self, symbol: &str) -> Updated<bool> {
        let value = self.preferences.toggle_favorite(symbol);
        tracing::debug!(symbol, favorite = value, "Favorite toggled");
        let notice = self.persist().await;
        Updated { value, notice }
    }

    /// Switch theme and persist the change.
    pub async fn toggle_theme(&mut self) -> Updated<Theme> {
        let value = self.preferences.toggle_theme();
        let notice = self.persist().await;
        Updated { value, notice }
    }

    async fn persist(&self) -> Option<Notice> {
        match self.store.save(&self.preferences).await {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(error = %e, "Failed to save preferences");
                Some(Notice::SaveFailed {
                    reason: e.to_string(),
                })
            }
        }
    }
}
