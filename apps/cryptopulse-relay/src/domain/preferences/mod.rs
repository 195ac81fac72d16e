//! User Preferences
//!
//! Favorite symbols and the display theme. Stored under the same keys the
//! browser bundle uses for local storage so a preferences file can be moved
//! between the two.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Display theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light background.
    #[default]
    Light,
    /// Dark background.
    Dark,
}

impl Theme {
    /// The other theme.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    /// Theme name as stored.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

/// Favorites and theme for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(rename = "crypto-favorites", default)]
    favorites: BTreeSet<String>,
    #[serde(rename = "crypto-theme", default)]
    theme: Theme,
}

impl Preferences {
    /// Create preferences with the given favorites and theme.
    #[must_use]
    pub fn new(favorites: impl IntoIterator<Item = String>, theme: Theme) -> Self {
        Self {
            favorites: favorites.into_iter().collect(),
            theme,
        }
    }

    /// Add the symbol if absent, remove it if present.
    ///
    /// Returns `true` if the symbol is a favorite afterwards.
    pub fn toggle_favorite(&mut self, symbol: &str) -> bool {
        if self.favorites.remove(symbol) {
            false
        } else {
            self.favorites.insert(symbol.to_string());
            true
        }
    }

    /// Whether the symbol is a favorite.
    #[must_use]
    pub fn is_favorite(&self, symbol: &str) -> bool {
        self.favorites.contains(symbol)
    }

    /// Favorite symbols.
    #[must_use]
    pub const fn favorites(&self) -> &BTreeSet<String> {
        &self.favorites
    }

    /// Current theme.
    #[must_use]
    pub const fn theme(&self) -> Theme {
        self.theme
    }

    /// Switch between light and dark, returning the new theme.
    pub const fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.theme
    }
}
