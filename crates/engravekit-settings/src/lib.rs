//! EngraveKit Settings Crate
//!
//! Application configuration, the engraving area document, the data
//! directory layout and shared handles for live settings updates.

pub mod area;
pub mod config;
pub mod error;
pub mod handle;
pub mod paths;

pub use area::EngravingArea;
pub use config::{
    Config, ConnectionSettings, ConnectionType, IntakeSettings, JobSettings, LaserSettings,
    ServerSettings, SettingsDocument, TextSettings,
};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
pub use handle::SettingsHandle;
pub use paths::{DataPaths, DATA_DIR_ENV};
