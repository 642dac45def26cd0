//! Data directory layout
//!
//! Everything EngraveKit persists lives under one directory:
//!
//! ```text
//! <data dir>/
//!   config.toml            (or config.json when present)
//!   engraving_area.json
//!   placements.json
//!   placements_archive_<timestamp>.json
//!   jobs.json
//!   programs/<job id>.gcode
//!   inbox/                 spool directory for file-based intake
//! ```

use std::path::{Path, PathBuf};

use crate::error::{SettingsError, SettingsResult};

/// Overrides the data directory
pub const DATA_DIR_ENV: &str = "ENGRAVEKIT_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Use `root` as the data directory, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> SettingsResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            SettingsError::DataDirectory(format!("{}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    /// `$ENGRAVEKIT_DATA_DIR`, else the platform data directory
    pub fn from_env() -> SettingsResult<Self> {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
            return Self::new(PathBuf::from(dir));
        }
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| SettingsError::DataDirectory("no home directory".to_string()))?;
        path.push("engravekit");
        Self::new(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `config.json` if it exists, otherwise `config.toml`
    pub fn config_file(&self) -> PathBuf {
        let json = self.root.join("config.json");
        if json.exists() {
            json
        } else {
            self.root.join("config.toml")
        }
    }

    pub fn area_file(&self) -> PathBuf {
        self.root.join("engraving_area.json")
    }

    pub fn placements_file(&self) -> PathBuf {
        self.root.join("placements.json")
    }

    pub fn jobs_file(&self) -> PathBuf {
        self.root.join("jobs.json")
    }

    pub fn programs_dir(&self) -> PathBuf {
        self.root.join("programs")
    }

    pub fn spool_dir(&self) -> PathBuf {
        self.root.join("inbox")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path().join("data")).unwrap();
        assert!(paths.root().is_dir());
        assert_eq!(paths.config_file(), paths.root().join("config.toml"));
        assert_eq!(paths.jobs_file(), paths.root().join("jobs.json"));

        std::fs::write(paths.root().join("config.json"), "{}").unwrap();
        assert_eq!(paths.config_file(), paths.root().join("config.json"));
    }
}
