//! Shared, swappable settings
//!
//! A [`SettingsHandle`] owns the current document behind an `Arc`. Readers
//! take a snapshot and keep using it for the whole operation; writers
//! validate, persist, then swap the pointer. A job that started with one
//! configuration therefore finishes with it.

use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::SettingsDocument;
use crate::error::SettingsResult;

pub struct SettingsHandle<T: SettingsDocument> {
    current: RwLock<Arc<T>>,
    path: Option<PathBuf>,
    // serializes read-modify-write updates
    write_lock: Mutex<()>,
}

impl<T: SettingsDocument> SettingsHandle<T> {
    /// A handle that never touches the filesystem
    pub fn in_memory(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Load `path`, or write defaults there when it does not exist yet
    pub fn load_or_default(path: impl Into<PathBuf>) -> SettingsResult<Self> {
        let path = path.into();
        let value = if path.exists() {
            let value = T::load_from_file(&path)?;
            tracing::info!(path = %path.display(), "Settings loaded");
            value
        } else {
            let value = T::default();
            value.save_to_file(&path)?;
            tracing::info!(path = %path.display(), "Default settings written");
            value
        };
        Ok(Self {
            current: RwLock::new(Arc::new(value)),
            path: Some(path),
            write_lock: Mutex::new(()),
        })
    }

    /// Current document
    pub fn snapshot(&self) -> Arc<T> {
        self.current.read().clone()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Validate, persist and publish a new document
    pub fn replace(&self, value: T) -> SettingsResult<Arc<T>> {
        let _guard = self.write_lock.lock();
        self.store(value)
    }

    /// Apply `f` to a copy of the current document and store the result.
    ///
    /// When validation or persistence fails the current document is kept.
    pub fn update<F>(&self, f: F) -> SettingsResult<Arc<T>>
    where
        F: FnOnce(&mut T) -> SettingsResult<()>,
    {
        let _guard = self.write_lock.lock();
        let mut next = (*self.snapshot()).clone();
        f(&mut next)?;
        self.store(next)
    }

    fn store(&self, value: T) -> SettingsResult<Arc<T>> {
        value.validate()?;
        if let Some(path) = &self.path {
            value.save_to_file(path)?;
        }
        let value = Arc::new(value);
        *self.current.write() = value.clone();
        Ok(value)
    }
}

impl<T: SettingsDocument + std::fmt::Debug> std::fmt::Debug for SettingsHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsHandle")
            .field("current", &self.snapshot())
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::EngravingArea;
    use crate::config::Config;
    use serde_json::json;

    #[test]
    fn test_load_or_default_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let handle = SettingsHandle::<Config>::load_or_default(&path).unwrap();
        assert!(path.exists());
        assert_eq!(*handle.snapshot(), Config::default());
    }

    #[test]
    fn test_update_persists_and_snapshots_are_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let handle = SettingsHandle::<Config>::load_or_default(&path).unwrap();

        let before = handle.snapshot();
        handle
            .update(|c| {
                *c = c.merged(&json!({ "laser_settings": { "power_percent": 75 } }))?;
                Ok(())
            })
            .unwrap();

        assert_eq!(before.laser_settings.power_percent, 50.0);
        assert_eq!(handle.snapshot().laser_settings.power_percent, 75.0);

        let reloaded = SettingsHandle::<Config>::load_or_default(&path).unwrap();
        assert_eq!(reloaded.snapshot().laser_settings.power_percent, 75.0);
    }

    #[test]
    fn test_invalid_replace_keeps_current() {
        let handle = SettingsHandle::in_memory(EngravingArea::default());
        let result = handle.replace(EngravingArea::new(-5.0, 10.0));
        assert!(result.is_err());
        assert_eq!(*handle.snapshot(), EngravingArea::default());
        assert!(handle.path().is_none());
    }
}
