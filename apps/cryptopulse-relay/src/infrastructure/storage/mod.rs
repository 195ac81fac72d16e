//! Preferences persisted as a small JSON document on local disk.
//!
//! ```json
//! {"crypto-favorites":["BTC","ETH"],"crypto-theme":"dark"}
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::application::ports::{PreferencesStore, StoreError};
use crate::domain::preferences::Preferences;

/// Default preferences file name.
pub const DEFAULT_PREFERENCES_PATH: &str = "cryptopulse-preferences.json";

/// [`PreferencesStore`] backed by a JSON file.
///
/// Writes go to a sibling temp file that is then renamed over the target, so
/// a crash mid-write never leaves a truncated document behind.
#[derive(Debug, Clone)]
pub struct JsonFilePreferencesStore {
    path: PathBuf,
}

impl JsonFilePreferencesStore {
    /// Store preferences at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File the preferences live in.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl PreferencesStore for JsonFilePreferencesStore {
    async fn load(&self) -> Result<Option<Preferences>, StoreError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if text.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn save(&self, preferences: &Preferences) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(preferences)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), "Preferences saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::preferences::Theme;

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePreferencesStore::new(dir.path().join("prefs.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePreferencesStore::new(dir.path().join("nested/prefs.json"));
        let prefs = Preferences::new(vec!["BTC".to_string(), "SOL".to_string()], Theme::Dark);

        store.save(&prefs).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(prefs));
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn written_document_uses_storage_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePreferencesStore::new(dir.path().join("prefs.json"));
        store
            .save(&Preferences::new(vec!["ETH".to_string()], Theme::Light))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["crypto-favorites"][0], "ETH");
        assert_eq!(json["crypto-theme"], "light");
    }

    #[tokio::test]
    async fn corrupt_file_is_an_encoding_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "{{{").unwrap();

        let err = JsonFilePreferencesStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Encoding(_)));
    }

    #[tokio::test]
    async fn unwritable_location_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();

        let store = JsonFilePreferencesStore::new(blocker.join("prefs.json"));
        let err = store.save(&Preferences::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
