//! Placement records and their file.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use engravekit_core::{persist, PlacementError, Rect, Size};

/// A committed placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRecord {
    /// Job id, or a fresh id for manual block-outs
    pub id: String,
    pub rect: Rect,
    pub text: String,
    pub text_height_mm: f64,
    pub created_at: DateTime<Utc>,
    /// Reserved by an operator rather than engraved by a job
    #[serde(default)]
    pub manual: bool,
}

#[derive(Debug, Deserialize)]
struct PlacementFile {
    placements: Vec<PlacementRecord>,
}

/// JSON file holding the records in commit order
#[derive(Debug, Clone)]
pub struct PlacementStore {
    path: Option<PathBuf>,
}

fn storage(err: impl std::fmt::Display) -> PlacementError {
    PlacementError::Storage {
        reason: err.to_string(),
    }
}

impl PlacementStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A store that keeps nothing
    pub fn in_memory() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load(&self) -> Result<Vec<PlacementRecord>, PlacementError> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        let file: Option<PlacementFile> = persist::read_json(path).map_err(storage)?;
        Ok(file.map(|f| f.placements).unwrap_or_default())
    }

    pub fn save(&self, surface: Size, records: &[PlacementRecord]) -> Result<(), PlacementError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        #[derive(Serialize)]
        struct Borrowed<'a> {
            surface: Size,
            placements: &'a [PlacementRecord],
        }
        persist::write_json(
            path,
            &Borrowed {
                surface,
                placements: records,
            },
        )
        .map_err(storage)
    }

    /// Copy the current file to `<stem>_archive_<timestamp>.json`.
    ///
    /// Returns `None` when there is no file to copy.
    pub fn archive(&self) -> Result<Option<PathBuf>, PlacementError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("placements");
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let mut backup = path.with_file_name(format!("{}_archive_{}.json", stem, stamp));
        let mut n = 1;
        while backup.exists() {
            backup = path.with_file_name(format!("{}_archive_{}_{}.json", stem, stamp, n));
            n += 1;
        }

        std::fs::copy(path, &backup).map_err(storage)?;
        tracing::info!(backup = %backup.display(), "Placements archived");
        Ok(Some(backup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, rect: Rect) -> PlacementRecord {
        PlacementRecord {
            id: id.to_string(),
            rect,
            text: id.to_uppercase(),
            text_height_mm: 5.0,
            created_at: Utc::now(),
            manual: false,
        }
    }

    #[test]
    fn test_save_load_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlacementStore::new(dir.path().join("placements.json"));
        assert!(store.load().unwrap().is_empty());

        let records = vec![
            record("b", Rect::new(0.0, 0.0, 10.0, 5.0)),
            record("a", Rect::new(10.0, 0.0, 10.0, 5.0)),
        ];
        store.save(Size::new(200.0, 298.0), &records).unwrap();
        assert_eq!(store.load().unwrap(), records);
    }

    #[test]
    fn test_archive_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlacementStore::new(dir.path().join("placements.json"));
        assert_eq!(store.archive().unwrap(), None);

        store
            .save(Size::new(200.0, 298.0), &[record("a", Rect::new(0.0, 0.0, 1.0, 1.0))])
            .unwrap();
        let first = store.archive().unwrap().unwrap();
        let second = store.archive().unwrap().unwrap();
        assert_ne!(first, second);
        assert!(first
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap()
            .starts_with("placements_archive_"));
        assert_eq!(
            std::fs::read(&first).unwrap(),
            std::fs::read(store.path().unwrap()).unwrap()
        );
    }
}
