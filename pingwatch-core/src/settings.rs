//! Runtime settings
//!
//! Handles:
//! - The close-to-tray preference chosen on first run
//! - Versioned compare-and-set updates
//! - Atomic TOML persistence under the OS config directory
//!
//! Kept apart from the static monitor configuration, which is never
//! written back.

use crate::error::SettingsError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Bumped by one on every successful update
    #[serde(default)]
    pub version: u64,
    /// Unset until the user answers the first-run question
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_to_tray: Option<bool>,
}

pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<RuntimeSettings>,
    /// Serialises writers across the file write
    write_lock: Mutex<()>,
}

impl SettingsStore {
    /// `<config dir>/pingwatch/settings.toml`
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let mut path = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        path.push("pingwatch");
        path.push("settings.toml");
        Ok(path)
    }

    /// Load settings from `path`, or start from version 0 when absent
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let settings = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            let settings: RuntimeSettings = toml::from_str(&content)?;
            debug!("loaded settings v{} from {}", settings.version, path.display());
            settings
        } else {
            info!("no settings at {}, using defaults", path.display());
            RuntimeSettings::default()
        };

        Ok(Self {
            path,
            current: RwLock::new(settings),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> RuntimeSettings {
        self.current.read().clone()
    }

    pub fn is_first_run(&self) -> bool {
        self.current.read().close_to_tray.is_none()
    }

    /// Apply `change` if the stored version still equals `expected_version`.
    /// The new value is persisted before it becomes visible to readers.
    pub async fn update<F>(
        &self,
        expected_version: u64,
        change: F,
    ) -> Result<RuntimeSettings, SettingsError>
    where
        F: FnOnce(&mut RuntimeSettings),
    {
        let _guard = self.write_lock.lock().await;

        let mut next = self.current();
        if next.version != expected_version {
            return Err(SettingsError::VersionConflict {
                expected: expected_version,
                current: next.version,
            });
        }

        change(&mut next);
        next.version = expected_version + 1;
        self.persist(&next).await?;

        *self.current.write() = next.clone();
        info!("settings updated to v{}", next.version);
        Ok(next)
    }

    async fn persist(&self, settings: &RuntimeSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = toml::to_string_pretty(settings)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_missing_starts_at_zero() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.toml")).await.unwrap();
        assert_eq!(store.current(), RuntimeSettings::default());
        assert!(store.is_first_run());
    }

    #[tokio::test]
    async fn test_update_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let store = SettingsStore::open(&path).await.unwrap();

        let updated = store.update(0, |s| s.close_to_tray = Some(true)).await.unwrap();
        assert_eq!(updated.version, 1);
        assert!(!store.is_first_run());

        let reopened = SettingsStore::open(&path).await.unwrap();
        assert_eq!(reopened.current(), updated);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.toml")).await.unwrap();
        store.update(0, |s| s.close_to_tray = Some(false)).await.unwrap();

        let err = store
            .update(0, |s| s.close_to_tray = Some(true))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::VersionConflict { expected: 0, current: 1 }
        ));
        assert_eq!(store.current().close_to_tray, Some(false));
    }

    #[tokio::test]
    async fn test_concurrent_writers_one_wins() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SettingsStore::open(dir.path().join("settings.toml")).await.unwrap());

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.update(0, |s| s.close_to_tray = Some(true)).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.update(0, |s| s.close_to_tray = Some(false)).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(store.current().version, 1);
    }

    #[test]
    fn test_default_path() {
        if let Ok(path) = SettingsStore::default_path() {
            assert!(path.ends_with("pingwatch/settings.toml"));
        }
    }
}
